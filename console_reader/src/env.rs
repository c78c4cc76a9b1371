use std::io;

use dotenvy::dotenv;
use tracing::warn;

/// Load the local `.env`, if any, so `FHDECODE_*` flags can live there.
///
/// IO errors are treated as the file not existing.
pub fn load_dotenvy_vars_if_present() {
    match dotenv() {
        Ok(_) | Err(dotenvy::Error::Io(io::Error { .. })) => (),
        Err(e) => warn!("found a local `.env` file but could not parse it: {e}"),
    }
}
