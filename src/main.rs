//! Stencil CLI
//!
//! Usage:
//!   stencil [OPTIONS]
//!
//! Options:
//!   -g, --group <PATH>        Group file (.stg) or template directory
//!   -t, --template <NAME>     Template of the group to render
//!   -s, --source <TEXT>       Inline template text
//!   -a, --attr <NAME=VALUE>   Bind an attribute (repeatable)
//!   --aggregate <SPEC=V1,V2>  Bind an aggregate such as `items.{a,b}=1,2`
//!   -w, --width <N>           Line width for `wrap`
//!   --delimiters <XY>         Delimiter pair for inline text, e.g. `$$`
//!   --syntax                  Only check syntax
//!   -d, --debug               Debug logging

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::Parser;

use stencil::{Delimiters, RenderConfig, TemplateError, TemplateGroup, TemplateInstance, Value};

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Render StringTemplate-style templates")]
struct Cli {
    /// Group file (.stg) or directory of .st templates
    #[arg(short, long)]
    group: Option<PathBuf>,

    /// Name of the group template to render
    #[arg(short, long, requires = "group", conflicts_with = "source")]
    template: Option<String>,

    /// Inline template text (reads from stdin if neither this nor --template is given)
    #[arg(short, long)]
    source: Option<String>,

    /// Attribute binding NAME=VALUE; repeat a name to build a sequence
    #[arg(short, long = "attr", value_name = "NAME=VALUE")]
    attrs: Vec<String>,

    /// Aggregate binding such as `items.{first,last}=Ter,Parr`
    #[arg(long = "aggregate", value_name = "SPEC=V1,V2")]
    aggregates: Vec<String>,

    /// Line width used by `wrap`
    #[arg(short, long)]
    width: Option<usize>,

    /// Two-character delimiter pair for inline or stdin text
    #[arg(long)]
    delimiters: Option<String>,

    /// Check syntax and report errors without rendering
    #[arg(long)]
    syntax: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let group = cli.group.as_deref().map(|path| or_exit(load_group(path)));

    let delimiters = match &cli.delimiters {
        Some(pair) => match Delimiters::from_pair(pair) {
            Some(d) => Some(d),
            None => {
                eprintln!("Error: delimiters must be two characters, got '{}'", pair);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let mut instance = match (&cli.template, &group) {
        (Some(name), Some(group)) => or_exit(group.get_instance_of(name)),
        _ => {
            let source = match &cli.source {
                Some(source) => source.clone(),
                None => read_stdin(),
            };
            or_exit(instance_from_text(&source, group.as_ref(), delimiters))
        }
    };

    if cli.syntax {
        println!("ok: {}", instance.name());
        return;
    }

    for attr in &cli.attrs {
        let Some((name, value)) = attr.split_once('=') else {
            eprintln!("Error: expected NAME=VALUE, got '{}'", attr);
            std::process::exit(1);
        };
        instance.bind(name.trim(), parse_value(value));
    }

    for aggregate in &cli.aggregates {
        let Some((spec, values)) = aggregate.split_once('=') else {
            eprintln!("Error: expected SPEC=V1,V2, got '{}'", aggregate);
            std::process::exit(1);
        };
        let values = values.split(',').map(parse_value);
        if let Err(e) = instance.bind_aggregate(spec, values) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let config = match cli.width {
        Some(width) => RenderConfig::new().with_line_width(width),
        None => RenderConfig::new(),
    };
    match instance.render_with_config(&config) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_group(path: &Path) -> Result<TemplateGroup, TemplateError> {
    if path.is_dir() {
        TemplateGroup::from_dir(path)
    } else {
        TemplateGroup::from_group_file(path)
    }
}

fn instance_from_text(
    source: &str,
    group: Option<&TemplateGroup>,
    delimiters: Option<Delimiters>,
) -> Result<TemplateInstance, TemplateError> {
    match (group, delimiters) {
        (Some(group), Some(delimiters)) => {
            group.instance_from_source_with_delimiters(source, delimiters)
        }
        (Some(group), None) => group.instance_from_source(source),
        (None, delimiters) => {
            TemplateInstance::from_source_with_delimiters(source, delimiters.unwrap_or_default())
        }
    }
}

/// `true`/`false` and integers keep their type, everything else is text
fn parse_value(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => text
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::from(text)),
    }
}

fn read_stdin() -> String {
    let mut buffer = String::new();
    match io::stdin().read_to_string(&mut buffer) {
        Ok(_) => buffer,
        Err(e) => {
            eprintln!("Error reading from stdin: {}", e);
            std::process::exit(1);
        }
    }
}

fn or_exit<T>(result: Result<T, TemplateError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{}", e.report());
            std::process::exit(1);
        }
    }
}
