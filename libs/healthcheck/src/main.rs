use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use healthcheck::{ChartOptions, Config, HealthCheck, load_path, load_roborio};
use tabled::Table;
use tabled::settings::style::Style;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
#[command(version, about = "Review robot health-check runs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(
        long,
        global = true,
        value_enum,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace)"
    )]
    log_level: LogLevel,
    #[clap(long, global = true, help = "Path to the configuration file")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    #[command(about = "Fetch a run from the robot and archive it")]
    Fetch(FetchArgs),
    #[command(about = "Convert a JSON document into a snapshot")]
    Import(ImportArgs),
    #[command(about = "List subsystems in a run")]
    Subsystems(InputArgs),
    #[command(about = "List the cases in a run")]
    Cases(CasesArgs),
    #[command(about = "Find the subsystem a controller belongs to")]
    Lookup(LookupArgs),
    #[command(about = "Print padded plot ranges for a selection")]
    Limits(SelectionArgs),
    #[command(about = "Render a chart of a selection")]
    Plot(PlotArgs),
}

#[derive(clap::Args, Clone, Debug)]
struct FetchArgs {
    #[clap(long, help = "Robot endpoint, overrides the configured one")]
    endpoint: Option<String>,
    #[clap(long, short, help = "Also write the snapshot to this path")]
    output: Option<PathBuf>,
    #[clap(long, help = "Replace an existing output file")]
    overwrite: bool,
}

#[derive(clap::Args, Clone, Debug)]
struct ImportArgs {
    #[clap(help = "Path to the JSON document")]
    input: PathBuf,
    #[clap(long, short, help = "Snapshot path or directory")]
    output: Option<PathBuf>,
    #[clap(long, help = "Replace an existing output file")]
    overwrite: bool,
}

#[derive(clap::Args, Clone, Debug)]
struct InputArgs {
    #[clap(help = "JSON document or snapshot")]
    input: PathBuf,
}

#[derive(clap::Args, Clone, Debug)]
struct CasesArgs {
    #[clap(help = "JSON document or snapshot")]
    input: PathBuf,
    #[clap(long, help = "Only cases run against the swerve drive")]
    swerve: bool,
}

#[derive(clap::Args, Clone, Debug)]
struct LookupArgs {
    #[clap(help = "JSON document or snapshot")]
    input: PathBuf,
    #[clap(help = "Measured controller id")]
    controller: i64,
}

#[derive(clap::Args, Clone, Debug)]
struct SelectionArgs {
    #[clap(help = "JSON document or snapshot")]
    input: PathBuf,
    #[clap(long = "case", required = true, num_args = 1.., help = "Case ids")]
    cases: Vec<i64>,
    #[clap(
        long = "controller",
        num_args = 1..,
        help = "Controller ids, defaults to every controller sampled in the selected cases"
    )]
    controllers: Vec<i64>,
}

#[derive(clap::Args, Clone, Debug)]
struct PlotArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    #[clap(long, help = "Add a voltage panel")]
    voltage: bool,
    #[clap(long, help = "Add a stator current panel")]
    stator_current: bool,
    #[clap(long, short, default_value = "healthcheck.svg", help = "Output SVG file")]
    output: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl SelectionArgs {
    fn load(&self, config: &Config) -> miette::Result<(HealthCheck, Vec<i64>)> {
        let mut health_check = load_path(&self.input)?;
        config.apply_limits(&mut health_check)?;
        let controllers = if self.controllers.is_empty() {
            let mut controllers: Vec<i64> = self
                .cases
                .iter()
                .flat_map(|&case| health_check.controllers_for_case(case))
                .collect();
            controllers.sort_unstable();
            controllers.dedup();
            controllers
        } else {
            self.controllers.clone()
        };
        Ok((health_check, controllers))
    }
}

fn main() -> miette::Result<()> {
    let args = Cli::parse();
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        EnvFilter::builder().parse_lossy(format!("healthcheck={}", args.log_level.as_str()))
    };
    let _ = tracing_subscriber::fmt::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
            "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        ))
        .try_init();

    let config = Config::load(args.config.as_deref())?;
    match args.command {
        Commands::Fetch(FetchArgs {
            endpoint,
            output,
            overwrite,
        }) => {
            let endpoint = endpoint.unwrap_or_else(|| config.endpoint.clone());
            let health_check = load_roborio(&endpoint, config.timeout())?;
            let archived = health_check.archive(&config.history_dir)?;
            info!(path = %archived.display(), "archived run");
            if let Some(output) = output {
                let path = health_check.save(Some(&output), overwrite)?;
                println!("{}", path.display());
            } else {
                println!("{}", archived.display());
            }
        }
        Commands::Import(ImportArgs {
            input,
            output,
            overwrite,
        }) => {
            let health_check = load_path(&input)?;
            let path = health_check.save(output.as_deref(), overwrite)?;
            println!("{}", path.display());
        }
        Commands::Subsystems(InputArgs { input }) => {
            for name in load_path(&input)?.subsystems() {
                println!("{name}");
            }
        }
        Commands::Cases(CasesArgs { input, swerve }) => {
            let health_check = load_path(&input)?;
            let cases = if swerve {
                healthcheck::SwerveDriveHealthCheck::new(&health_check, &config.swerve_subsystem)
                    .cases()
            } else {
                health_check.cases()
            };
            let mut table = Table::new(cases);
            table.with(Style::rounded());
            println!("{table}");
        }
        Commands::Lookup(LookupArgs { input, controller }) => {
            println!("{}", load_path(&input)?.subsystem_for_controller(controller));
        }
        Commands::Limits(selection) => {
            let (health_check, controllers) = selection.load(&config)?;
            let limits = health_check.plot_y_limits(&selection.cases, &controllers)?;
            println!("supply_current {:?}", limits.supply_current);
            println!("stator_current {:?}", limits.stator_current);
            println!("speed {:?}", limits.speed);
        }
        Commands::Plot(PlotArgs {
            selection,
            voltage,
            stator_current,
            output,
        }) => {
            let (health_check, controllers) = selection.load(&config)?;
            let plan = health_check.chart_plan(
                &selection.cases,
                &controllers,
                ChartOptions {
                    voltage,
                    stator_current,
                },
            )?;
            plan.render(&output)?;
            println!("{}", output.display());
        }
    }
    Ok(())
}
