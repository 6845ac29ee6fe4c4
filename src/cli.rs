use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "folio",
    version,
    about = "Annotation anchoring and reading-position tools for reflowable books.",
    long_about = None
)]
pub struct Cli {
    /// Use a specific configuration file
    #[clap(short = 'c', long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Annotation service base URL, overriding the configuration
    #[clap(long, value_name = "URL", global = true)]
    pub api: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Enable debug output
    #[clap(long, global = true)]
    pub debug: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the reading blocks of a chapter file
    Blocks {
        /// Chapter HTML file
        file: PathBuf,

        /// Prefix for generated block ids
        #[clap(long)]
        prefix: Option<String>,
    },

    /// Turn a selection into an anchor
    Resolve {
        file: PathBuf,

        /// Selection start as BLOCK:OFFSET
        #[clap(long, value_name = "BLOCK:OFFSET")]
        from: String,

        /// Selection end as BLOCK:OFFSET
        #[clap(long, value_name = "BLOCK:OFFSET")]
        to: String,

        /// Chapter href recorded on the anchor (defaults to the file name)
        #[clap(long)]
        href: Option<String>,

        #[clap(long, default_value = "")]
        title: String,
    },

    /// Show the text an anchor points at
    Locate {
        file: PathBuf,
        block: String,
        start: usize,
        end: usize,
    },

    /// Print a chapter with its annotations painted in
    Render {
        file: PathBuf,

        /// Book id on the annotation service
        #[clap(long, required_unless_present = "annotations")]
        book: Option<String>,

        /// Read annotations from a JSON file instead of the service
        #[clap(long, value_name = "FILE")]
        annotations: Option<PathBuf>,

        /// Chapter href the annotations were made against (defaults to the file name)
        #[clap(long)]
        href: Option<String>,
    },

    /// List a book's annotations from the annotation service
    Annotations {
        book: String,

        /// Only annotations in this chapter
        #[clap(long)]
        chapter: Option<String>,
    },

    /// Show or clear the stored reading position of a book
    Progress {
        book: String,

        /// Number of chapters in the book, for the overall percentage
        #[clap(long)]
        chapters: Option<usize>,

        /// Forget the stored position
        #[clap(long)]
        clear: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::parse_from([
            "folio", "-vv", "resolve", "ch1.xhtml", "--from", "__auto_3:6", "--to", "__auto_3:11",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Resolve { from, to, href, .. } => {
                assert_eq!(from, "__auto_3:6");
                assert_eq!(to, "__auto_3:11");
                assert!(href.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_render_requires_a_source() {
        assert!(Cli::try_parse_from(["folio", "render", "ch1.xhtml"]).is_err());
        assert!(Cli::try_parse_from(["folio", "render", "ch1.xhtml", "--book", "b"]).is_ok());
    }
}
