//! `adb-cli`: command-line front end (`arangoq`) for `adb-client`.

pub mod cli;
