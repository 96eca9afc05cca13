//! Fixture data shared by the index unit tests.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub(crate) const INDEX_DIR: &str = "index.disk";

/// (Id, UserName, Email)
pub(crate) const USERS: [(&str, &str, &str); 4] = [
    ("abcdefg-123", "mikey", "mikey@example.com"),
    ("hijklmn-456", "frank", "frank@example.com"),
    ("ewf4ofk-555", "jacky", "jacky@example.com"),
    ("rulan54-777", "jones", "jones@example.com"),
];

/// (Id, Kind, Color, Name)
pub(crate) const PETS: [(&str, &str, &str, &str); 4] = [
    ("rebef-123", "Dog", "Brown", "Waldo"),
    ("wefwe-456", "Cat", "White", "Snowy"),
    ("goefe-789", "Hog", "Green", "Dicky"),
    ("xadaf-189", "Hog", "Green", "Ricky"),
];

/// Writes one entity file per user and pet into a fresh temporary data dir.
pub(crate) fn write_test_data() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_entities(dir.path());
    dir
}

fn write_entities(data_dir: &Path) {
    let users = data_dir.join("users");
    fs::create_dir_all(&users).unwrap();
    for (id, user_name, email) in USERS {
        let body = format!(
            r#"{{"Id":"{}","UserName":"{}","Email":"{}"}}"#,
            id, user_name, email
        );
        fs::write(users.join(id), body).unwrap();
    }

    let pets = data_dir.join("pets");
    fs::create_dir_all(&pets).unwrap();
    for (id, kind, color, name) in PETS {
        let body = format!(
            r#"{{"Id":"{}","Kind":"{}","Color":"{}","Name":"{}"}}"#,
            id, kind, color, name
        );
        fs::write(pets.join(id), body).unwrap();
    }
}
