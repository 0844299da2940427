pub mod config;
pub mod generate;
pub mod init;
pub mod lifecycle;
pub mod new;
pub mod status;
