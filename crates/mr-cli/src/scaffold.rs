//! The `init` scaffold: a mock tree with one sample resource.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Result, WrapErr, bail};

use mr_core::HttpMethod;

const USERS_JSON: &str = r#"[
  { "id": 1, "name": "Alice", "email": "alice@email.com" },
  { "id": 2, "name": "Bob", "email": "bob@email.com" }
]
"#;

const CREATE_USER: &str = r#"return function(req, res)
  local body = req.body or {}
  res:status(201):json({
    message = string.format("User created: %s (%s)", body.name or "?", body.email or "?"),
    id = math.random(1, 9999),
    timestamp = os.date("!%Y-%m-%dT%H:%M:%SZ"),
  })
end
"#;

const UPDATE_USER: &str = r#"return function(req, res)
  local body = req.body or {}
  res:json({
    message = string.format("User updated: %s - %s (%s)", tostring(body.id), body.name or "?", body.email or "?"),
    timestamp = os.date("!%Y-%m-%dT%H:%M:%SZ"),
  })
end
"#;

const DELETE_USER: &str = r#"return function(req, res)
  local body = req.body or {}
  res:json({
    message = "User deleted: " .. tostring(body.id),
    timestamp = os.date("!%Y-%m-%dT%H:%M:%SZ"),
  })
end
"#;

/// Creates `<dir>/mocks` with a method directory per verb and sample
/// `users` handlers. Returns the files written.
///
/// Refuses to touch an existing `mocks` directory.
pub fn create_mock_tree(dir: &Utf8Path, script_extension: &str) -> Result<Vec<Utf8PathBuf>> {
    let mocks = dir.join("mocks");
    if mocks.exists() {
        bail!("{mocks} already exists, refusing to overwrite it");
    }

    for method in HttpMethod::ALL {
        let method_dir = mocks.join(method.dir_name());
        fs::create_dir_all(&method_dir)
            .wrap_err_with(|| format!("Failed to create {method_dir}"))?;
    }

    let users_script = format!("users.{script_extension}");
    let files = [
        (mocks.join("get").join("users.json"), USERS_JSON),
        (mocks.join("post").join(&users_script), CREATE_USER),
        (mocks.join("put").join(&users_script), UPDATE_USER),
        (mocks.join("delete").join(&users_script), DELETE_USER),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (path, contents) in files {
        fs::write(&path, contents).wrap_err_with(|| format!("Failed to write {path}"))?;
        written.push(path);
    }
    Ok(written)
}
