use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sbexchange",
    about = "Load, repair and re-save Scratch 2 (.sb2) project archives."
)]
pub struct Args {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT", help = "Re-save the normalized project to this path.")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Print scopes, declarations and renames after loading.")]
    pub summary: bool,

    #[arg(long, help = "Decode every costume to determine its pixel size.")]
    pub measure: bool,

    #[arg(
        long,
        default_value_t = 5000,
        help = "Give up on a costume decode after this many milliseconds."
    )]
    pub decode_timeout_ms: u64,

    #[arg(
        long,
        default_value_t = 100,
        help = "How often to check whether a costume decode has finished."
    )]
    pub poll_interval_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let args = Args::parse_from(["sbexchange", "in.sb2"]);
        assert_eq!(args.input, PathBuf::from("in.sb2"));
        assert!(args.output.is_none());
        assert!(!args.summary);
        assert_eq!(args.decode_timeout_ms, 5000);
        assert_eq!(args.poll_interval_ms, 100);
    }

    #[test]
    fn parses_output_and_flags() {
        let args = Args::parse_from([
            "sbexchange",
            "in.sb2",
            "out.sb2",
            "--measure",
            "--decode-timeout-ms",
            "250",
        ]);
        assert_eq!(args.output, Some(PathBuf::from("out.sb2")));
        assert!(args.measure);
        assert_eq!(args.decode_timeout_ms, 250);
    }
}
