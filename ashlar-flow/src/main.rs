use anyhow::{bail, Context, Result};
use ashlar_flow::passes::standard_passes;
use ashlar_flow::pipeline::{StageState, StageStatus};
use ashlar_flow::project::ProjectConfig;
use ashlar_flow::stages::standard_pipeline;
use std::path::PathBuf;

#[derive(Clone, Debug)]
struct Config {
    project_file: PathBuf,
    run_to: String,
    trace: bool,
    passes: Vec<String>,
}

fn parse_args() -> Config {
    use clap::{App, Arg};
    let matches = App::new("Ashlar")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Standard-cell placement, clock-tree synthesis and global routing")
        .arg(
            Arg::with_name("PROJECT")
                .help("Project description (JSON)")
                .index(1)
                .required(true),
        )
        .arg(
            Arg::with_name("RUN_TO")
                .long("run-to")
                .help("Last stage to execute")
                .takes_value(true)
                .default_value("check_timing_spef"),
        )
        .arg(
            Arg::with_name("TRACE")
                .long("trace")
                .help("Enable span tracing on stderr"),
        )
        .arg(
            Arg::with_name("PASS")
                .long("pass")
                .help("Run a pass after the flow, e.g. \"write_def out.def\"")
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .get_matches();

    Config {
        project_file: PathBuf::from(matches.value_of_os("PROJECT").unwrap()),
        run_to: matches.value_of("RUN_TO").unwrap().to_owned(),
        trace: matches.is_present("TRACE"),
        passes: matches
            .values_of("PASS")
            .map(|v| v.map(str::to_owned).collect())
            .unwrap_or_default(),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = parse_args();
    if config.trace {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let project = ProjectConfig::load(&config.project_file)?;
    let base = config
        .project_file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let pipeline = standard_pipeline(project, base);
    let events = pipeline.events();
    let worker = pipeline
        .run_up_to(&config.run_to)
        .with_context(|| format!("starting the flow up to {:?}", config.run_to))?;

    let mut failed_stage = None;
    loop {
        match events.try_pop() {
            Some(event) => match event.state {
                StageState::Running => println!("[{}] running", event.stage),
                StageState::Progress(pct) => println!("[{}] {}%", event.stage, pct),
                StageState::DoneOk => println!("[{}] done", event.stage),
                StageState::DoneError(message) => {
                    eprintln!("[{}] ERROR: {}", event.stage, message);
                    failed_stage = Some(event.stage);
                }
            },
            None => {
                if worker.is_finished() {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
        }
    }
    worker.join().expect("flow worker panicked");
    // Drain stragglers posted between the last pop and the join.
    while let Some(event) = events.try_pop() {
        if let StageState::DoneError(message) = event.state {
            eprintln!("[{}] ERROR: {}", event.stage, message);
            failed_stage = Some(event.stage);
        }
    }

    if let Some(stage) = failed_stage {
        eprintln!("flow stopped at stage {:?}", stage);
        std::process::exit(1);
    }
    if let Some(index) = pipeline.stage_index(&config.run_to) {
        debug_assert_eq!(pipeline.status(index), StageStatus::DoneOk);
    }

    if !config.passes.is_empty() {
        let mut manager = standard_passes()?;
        let design = pipeline.design();
        let mut design = design.write();
        for command in &config.passes {
            let mut words = command.split_whitespace();
            let Some(name) = words.next() else {
                bail!("empty -pass command");
            };
            let args: Vec<&str> = words.collect();
            manager
                .run(&mut design, name, &args)
                .with_context(|| format!("running pass {:?}", name))?;
            println!("[pass {}] done", name);
        }
    }
    Ok(())
}
