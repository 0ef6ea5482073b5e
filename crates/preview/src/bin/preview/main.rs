mod cli;

use indexmap::IndexMap;
use preview::diagnostics::Diagnostics;
use preview::owner::WorkspaceOwner;
use preview::parameter::Parameter;
use preview::value::Value;
use serde::Serialize;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("PREVIEW_LOG"))
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
        cli::Command::Preview(preview_cli) => preview_template(preview_cli),
        cli::Command::State(state_cli) => state_parameters(state_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

#[derive(Serialize)]
struct Report<'a> {
    parameters: &'a [Parameter],
    tags: IndexMap<String, String>,
    invalid_tags: Vec<String>,
    module_output: &'a Value,
    diagnostics: &'a Diagnostics,
}

pub fn preview_template(cli: cli::PreviewCommand) -> anyhow::Result<()> {
    let input = preview::Input {
        plan_json_path: cli.plan,
        parameter_values: cli.parameters.into_iter().collect(),
        owner: owner(cli.owner)?,
        max_passes: cli.max_passes,
        ..Default::default()
    };

    let output = match preview::preview_dir(&input, &std::env::current_dir()?) {
        Ok(output) => output,
        Err(diagnostics) => {
            eprintln!("{}", diagnostics.render(&IndexMap::new()));
            anyhow::bail!("Preview failed");
        }
    };

    if !output.diagnostics.is_empty() {
        eprintln!("{}", output.diagnostics.render(&output.files));
    }

    let report = Report {
        parameters: &output.parameters,
        tags: output.tags.valid_tags(),
        invalid_tags: output.tags.invalid_names(),
        module_output: &output.module_output,
        diagnostics: &output.diagnostics,
    };
    write(&cli.output, &report)?;

    anyhow::ensure!(
        !output.diagnostics.has_errors(),
        "Preview finished with {} error(s)",
        output.diagnostics.errors().count()
    );
    Ok(())
}

pub fn state_parameters(cli: cli::StateCommand) -> anyhow::Result<()> {
    let file = std::fs::File::open(&cli.file)?;
    let state: preview::plan::State = serde_json::from_reader(std::io::BufReader::new(file))?;

    let parameters = match state.root_module() {
        Some(root) => preview::extract::parameters_from_state(root)?,
        None => vec![],
    };

    write(&cli.output, &parameters)?;
    Ok(())
}

fn owner(args: cli::OwnerArgs) -> anyhow::Result<WorkspaceOwner> {
    let mut owner: WorkspaceOwner = match &args.file {
        Some(path) => serde_json::from_reader(std::io::BufReader::new(std::fs::File::open(path)?))?,
        None => WorkspaceOwner::default(),
    };

    if let Some(name) = args.name {
        owner.name = name;
    }
    if let Some(email) = args.email {
        owner.email = email;
    }
    if !args.groups.is_empty() {
        owner.groups = args.groups;
    }

    Ok(owner)
}

fn write(output: &cli::OutputArgs, value: &impl Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
