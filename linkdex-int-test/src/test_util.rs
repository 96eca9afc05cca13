use linkdex::entity::Record;
use linkdex::errors::{IndexError, IndexResult};
use linkdex::manager::IndexManager;
use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, fs, thread};

/// (Id, UserName, Email)
pub const USERS: [(&str, &str, &str); 4] = [
    ("abcdefg-123", "mikey", "mikey@example.com"),
    ("hijklmn-456", "frank", "frank@example.com"),
    ("ewf4ofk-555", "jacky", "jacky@example.com"),
    ("rulan54-777", "jones", "jones@example.com"),
];

/// (Id, Kind, Color, Name)
pub const PETS: [(&str, &str, &str, &str); 4] = [
    ("rebef-123", "Dog", "Brown", "Waldo"),
    ("wefwe-456", "Cat", "White", "Snowy"),
    ("goefe-789", "Hog", "Green", "Dicky"),
    ("xadaf-189", "Hog", "Green", "Ricky"),
];

/// Runs `test` between `before` and `after`, retrying a failed attempt.
/// `after` runs even when the test fails, so temporary data dirs are
/// removed on every path.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> IndexResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> IndexResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> IndexResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();
        let error = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                if !bt.is_empty() && !bt.contains("disabled") {
                    eprintln!("\nBacktrace:\n{}", bt);
                }
                e
            }
            Err(panic_err) => {
                let message = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                format!("Panic: {}", message)
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("Error: {}", error);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
        last_error = Some(error);
    }

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

#[derive(Clone)]
pub struct TestContext {
    path: String,
    manager: IndexManager,
}

impl TestContext {
    pub fn new(path: String, manager: IndexManager) -> Self {
        Self { path, manager }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn manager(&self) -> IndexManager {
        self.manager.clone()
    }

    pub fn index_dir(&self) -> PathBuf {
        self.manager.config().index_base_dir()
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    let temp_dir = env::temp_dir();
    temp_dir.join(id.to_string()).to_string_lossy().to_string()
}

/// Data dir with the entity files written and no index registered.
pub fn create_empty_context() -> IndexResult<TestContext> {
    let path = random_path();
    write_entity_files(Path::new(&path))?;
    let manager = IndexManager::builder().data_dir(&path).build()?;
    Ok(TestContext::new(path, manager))
}

/// Data dir with the entity files written and these indices registered:
/// unique `User.UserName`, unique `User.Email`, normal `Pet.Kind`,
/// normal `Pet.Color`, and a primary index for both types.
pub fn create_test_context() -> IndexResult<TestContext> {
    let ctx = create_empty_context()?;
    let manager = ctx.manager();
    manager.add_unique_index("User", "UserName", "users")?;
    manager.add_unique_index("User", "Email", "users")?;
    manager.add_primary_index("User", "users")?;
    manager.add_normal_index("Pet", "Kind", "pets")?;
    manager.add_normal_index("Pet", "Color", "pets")?;
    manager.add_primary_index("Pet", "pets")?;
    Ok(ctx)
}

/// [`create_test_context`] with every user and pet already indexed.
pub fn create_populated_context() -> IndexResult<TestContext> {
    let ctx = create_test_context()?;
    let manager = ctx.manager();
    for (id, user_name, email) in USERS {
        manager.add(id, &user_record(user_name, email))?;
    }
    for (id, kind, color, name) in PETS {
        manager.add(id, &pet_record(kind, color, name))?;
    }
    Ok(ctx)
}

pub fn cleanup(ctx: TestContext) -> IndexResult<()> {
    let path = Path::new(ctx.path());
    if !path.exists() {
        return Ok(());
    }
    fs::remove_dir_all(path).map_err(IndexError::from)
}

pub fn user_record(user_name: &str, email: &str) -> Record {
    Record::new("User")
        .with("UserName", user_name)
        .with("Email", email)
}

pub fn pet_record(kind: &str, color: &str, name: &str) -> Record {
    Record::new("Pet")
        .with("Kind", kind)
        .with("Color", color)
        .with("Name", name)
}

/// Writes one JSON entity file per user and pet, the way the entity store
/// lays them out.
pub fn write_entity_files(data_dir: &Path) -> IndexResult<()> {
    let users = data_dir.join("users");
    fs::create_dir_all(&users)?;
    for (id, user_name, email) in USERS {
        write_user_file(&users, id, user_name, email)?;
    }

    let pets = data_dir.join("pets");
    fs::create_dir_all(&pets)?;
    for (id, kind, color, name) in PETS {
        let body = format!(
            r#"{{"Id":"{}","Kind":"{}","Color":"{}","Name":"{}"}}"#,
            id, kind, color, name
        );
        fs::write(pets.join(id), body)?;
    }
    Ok(())
}

pub fn write_user_file(users_dir: &Path, id: &str, user_name: &str, email: &str) -> IndexResult<()> {
    let body = format!(
        r#"{{"Id":"{}","UserName":"{}","Email":"{}"}}"#,
        id, user_name, email
    );
    fs::write(users_dir.join(id), body)?;
    Ok(())
}

pub fn entry_names(dir: &Path) -> IndexResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}
