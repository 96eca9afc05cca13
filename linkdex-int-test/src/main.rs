use linkdex::errors::IndexResult;
use linkdex_int_test::test_util::{cleanup, create_test_context, user_record, write_user_file};

fn main() -> IndexResult<()> {
    println!("Starting stress test...");
    let ctx = create_test_context()?;
    let manager = ctx.manager();
    let users_dir = std::path::Path::new(ctx.path()).join("users");

    let count = 10000;
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = uuid::Uuid::new_v4().to_string();
        let user_name = format!("user-{}", i);
        write_user_file(&users_dir, &id, &user_name, &format!("{}@example.com", user_name))?;
        ids.push(id);
    }

    let start = std::time::Instant::now();
    for (i, id) in ids.iter().enumerate() {
        let user_name = format!("user-{}", i);
        manager.add(id, &user_record(&user_name, &format!("{}@example.com", user_name)))?;
    }
    println!("Indexed {} users in {:?}", count, start.elapsed());

    let start = std::time::Instant::now();
    for i in 0..count {
        manager.find("User", "Email", &format!("user-{}@example.com", i))?;
    }
    println!("Looked up {} users in {:?}", count, start.elapsed());

    let start = std::time::Instant::now();
    let hits = manager.search("User", "UserName", "user-1*")?;
    println!("Matched {} user names in {:?}", hits.len(), start.elapsed());

    let start = std::time::Instant::now();
    for id in &ids {
        manager.delete("User", id)?;
    }
    println!("Deleted {} users in {:?}", count, start.elapsed());

    cleanup(ctx)
}
