//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

/// Download content from a DAV server into a local mirror with rotating backups.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Specify a config file other than the default
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Destination directory
    #[arg(short, long, value_name = "DIR", default_value = "ocbackup")]
    pub destdir: PathBuf,

    /// Download only the specified remote subtree
    #[arg(short, long, value_name = "RMT_DIR", default_value = ".")]
    pub start: String,

    /// Append plain-text log lines to FILE
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Append a JSON line per run to FILE
    #[arg(long, value_name = "FILE")]
    pub journal: Option<PathBuf>,

    /// Show a progress spinner
    #[arg(short, long)]
    pub progress: bool,

    /// Log every listing and completed download
    #[arg(short, long)]
    pub verbose: bool,

    /// Remove the failure sentinel left by a previous run and sync anyway
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_historic_layout() {
        let args = Args::parse_from(["davmirror"]);
        assert_eq!(args.config, PathBuf::from("davmirror.json"));
        assert_eq!(args.destdir, PathBuf::from("ocbackup"));
        assert_eq!(args.start, ".");
        assert!(!args.force && !args.progress && !args.verbose);
    }

    #[test]
    fn short_flags() {
        let args = Args::parse_from(["davmirror", "-c", "x.toml", "-d", "/srv/m", "-s", "photos", "-v"]);
        assert_eq!(args.config, PathBuf::from("x.toml"));
        assert_eq!(args.destdir, PathBuf::from("/srv/m"));
        assert_eq!(args.start, "photos");
        assert!(args.verbose);
    }
}
