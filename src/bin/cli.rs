//! LeakKV CLI Client
//!
//! Publishes mutation records to a running leakkv-server.

use clap::{Parser, Subcommand};
use leakkv::network::Publisher;
use leakkv::Value;

/// LeakKV CLI
#[derive(Parser, Debug)]
#[command(name = "leakkv-cli")]
#[command(about = "Publish records to a LeakKV server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set (integers, floats and true/false are typed)
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn main() {
    let args = Args::parse();

    let mut publisher = match Publisher::connect(&args.server) {
        Ok(publisher) => publisher,
        Err(e) => {
            eprintln!("(error) cannot connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::Set { key, value } => publisher.set(key, parse_value(&value)),
        Commands::Del { key } => publisher.delete(key),
    };

    match result {
        Ok(()) => println!("OK"),
        Err(e) => {
            eprintln!("(error) {}", e);
            std::process::exit(1);
        }
    }
}

/// Best-effort typing of a command-line value
fn parse_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(x) = raw.parse::<f64>() {
        return Value::Float(x);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(raw.to_string()),
    }
}
