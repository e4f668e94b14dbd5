use clap::{ArgAction, Parser, Subcommand, ValueHint};
use up_xpkg::object::PackageType;

#[derive(Parser)]
#[command(
    name = "up",
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Directory of the local package cache
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<String>,

    /// Registry request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build, push and manage Crossplane packages
    #[command(arg_required_else_help = true)]
    Xpkg {
        #[command(subcommand)]
        command: XpkgCommand,
    },

    /// Print the effective configuration
    Config,

    /// Generate a default config file
    #[clap(name = "defconfig")]
    DefConfig,
}

#[derive(Subcommand)]
pub enum XpkgCommand {
    /// Build a package from a directory of YAML files
    Build {
        /// Directory holding crossplane.yaml and the package objects
        #[arg(short = 'f', long, default_value = ".", value_hint = ValueHint::DirPath)]
        package_root: String,

        /// Directory holding examples (default: <package-root>/examples)
        #[arg(long, value_hint = ValueHint::DirPath)]
        examples_root: Option<String>,

        /// Skip files matching the glob, relative to the package root
        #[arg(long)]
        ignore: Vec<String>,

        /// Output file (default: <package-root>/<name>-<digest>.xpkg)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<String>,
    },

    /// Push a built package to a registry
    #[command(arg_required_else_help = true)]
    Push {
        /// Destination, e.g. xpkg.upbound.io/org/name:v1.0.0
        #[arg(required = true)]
        tag: String,

        /// Package file (default: the single .xpkg in the current directory)
        #[arg(short = 'f', long, value_hint = ValueHint::FilePath)]
        package: Option<String>,
    },

    /// Manage package dependencies
    #[command(arg_required_else_help = true)]
    Dep {
        /// Remove every cached package
        #[arg(long)]
        clean_cache: bool,

        #[command(subcommand)]
        command: Option<DepCommand>,
    },
}

#[derive(Subcommand)]
pub enum DepCommand {
    /// Resolve a dependency, cache it and add it to crossplane.yaml
    #[command(arg_required_else_help = true)]
    Add {
        /// Package, optionally with a version constraint: <package>[@constraint]
        #[arg(required = true)]
        package: String,

        /// Package type of the dependency
        #[arg(long = "type", default_value = "provider")]
        package_type: PackageType,

        /// Directory holding crossplane.yaml
        #[arg(short = 'f', long, default_value = ".", value_hint = ValueHint::DirPath)]
        package_root: String,
    },

    /// List the cached versions of a package
    #[command(arg_required_else_help = true)]
    List {
        /// Package reference without a tag
        #[arg(required = true)]
        package: String,
    },
}
