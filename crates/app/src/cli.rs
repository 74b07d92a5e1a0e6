//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "mocap-viewer")]
#[command(about = "Plays back BVH motion capture on a skeleton", long_about = None)]
#[command(version)]
pub struct Cli {
    /// BVH motion file to play
    pub motion: PathBuf,

    /// Viewer configuration (TOML); defaults are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Disable the Vulkan validation layer even if the config enables it
    #[arg(long)]
    pub no_validation: bool,

    /// Print the skeleton hierarchy and motion summary, then exit
    #[arg(long)]
    pub dump_skeleton: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_motion_and_flags() {
        let cli = Cli::parse_from([
            "mocap-viewer",
            "walk.bvh",
            "--config",
            "viewer.toml",
            "--no-validation",
        ]);
        assert_eq!(cli.motion, PathBuf::from("walk.bvh"));
        assert_eq!(cli.config, Some(PathBuf::from("viewer.toml")));
        assert!(cli.no_validation);
        assert!(!cli.dump_skeleton);
    }

    #[test]
    fn test_motion_is_required() {
        assert!(Cli::try_parse_from(["mocap-viewer"]).is_err());
    }
}
