//! Error reporting for the command-line interface.

use std::error::Error;

/// Print an error followed by its chain of causes.
pub fn print_error(err: &dyn Error) {
    eprintln!("Error: {}", err);

    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}
