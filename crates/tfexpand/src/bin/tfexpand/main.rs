mod cli;

use tfexpand::{config, Engine, EngineConfig, ExpandedResource};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFEXPAND_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Evaluate(evaluate_cli) => evaluate(evaluate_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn evaluate(cli: cli::EvaluateCommand) -> anyhow::Result<()> {
    let engine = Engine::new(engine_config(&cli.limits, &cli.variables)?);
    let resources = engine.evaluate_path(&cli.path)?;

    output(&cli.output, &resources)?;
    Ok(())
}

fn engine_config(
    limits: &cli::LimitArgs,
    variables: &cli::VariableArgs,
) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::new(limits.max_count, limits.max_for_each);
    if let Some(max_module_depth) = limits.max_module_depth {
        config = config.with_max_module_depth(max_module_depth);
    }

    for file_path in &variables.files {
        config = config.with_variables(config::load_var_file(file_path)?);
    }

    for assignment in &variables.assignments {
        let (name, value) = config::parse_var_assignment(assignment)?;
        config = config.with_variable(name, value);
    }

    Ok(config)
}

fn output(output: &cli::OutputArgs, resources: &[ExpandedResource]) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), resources)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), resources)?,
    };

    Ok(())
}

/// (tfexpand-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let path = match &cli.command {
        Documents { path } | Document { path } => path,
    };

    let mut documents = tfexpand::hcl_documents::HclDocuments::default();
    documents.load_path(path)?;

    match cli.command {
        Documents { .. } => println!("{documents:#?}"),
        Document { .. } => {
            let document = tfexpand::document::Document::new(&documents)?;
            println!("{document:#?}")
        }
    }

    Ok(())
}
