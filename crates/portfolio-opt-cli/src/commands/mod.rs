pub mod allocate;
pub mod clean;
pub mod estimate;
pub mod optimize;
pub mod run;

use serde::de::DeserializeOwned;

use crate::input;

/// Read a typed request from `--input <file>` or piped stdin.
pub fn load_input<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::file::read_structured(path)
    } else if let Some(value) = input::stdin::read_stdin()? {
        Ok(value)
    } else {
        Err(format!("--input <file.json> or stdin required for {}", what).into())
    }
}
