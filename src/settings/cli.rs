use super::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    /// Path to a settings file, overriding the build-profile default.
    #[arg(long)]
    pub settings: Option<String>,

    /// Log filter directive, overriding the configured one.
    #[arg(long)]
    pub log: Option<String>,
}
