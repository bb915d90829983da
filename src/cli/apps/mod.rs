//! Built-in command groups.

pub mod db;
