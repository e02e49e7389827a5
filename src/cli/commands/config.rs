//! `config` command - print the active settings.

use crate::config::Settings;
use crate::io::{Envelope, ExitCode};

pub fn run(settings: &Settings, json: bool) -> ExitCode {
    if json {
        let envelope = Envelope::success(settings);
        println!("{}", envelope.to_json().expect("envelope serializes"));
    } else {
        match toml::to_string_pretty(settings) {
            Ok(text) => println!("{text}"),
            Err(error) => eprintln!("failed to render settings: {error}"),
        }
    }
    ExitCode::Success
}
