use clap::{Arg, Command};
use log::LevelFilter;
use phishscore::analyzer::EmailInput;
use phishscore::behavior_store::{BehaviorStore, JsonFileStore, MemoryStore};
use phishscore::config::{AnalyzerConfig, PatternConfig, Sensitivity};
use phishscore::engines::Severity;
use phishscore::PhishingAnalyzer;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("phishscore")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-engine phishing risk scoring for email content")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Pattern configuration file (YAML); bundled defaults are used if omitted"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write the default pattern configuration and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("from")
                .long("from")
                .value_name("ADDR")
                .help("Sender (From header value)")
                .default_value(""),
        )
        .arg(
            Arg::new("subject")
                .long("subject")
                .value_name("TEXT")
                .help("Message subject")
                .default_value(""),
        )
        .arg(
            Arg::new("body-file")
                .long("body-file")
                .value_name("FILE")
                .help("File containing the message body"),
        )
        .arg(
            Arg::new("headers-file")
                .long("headers-file")
                .value_name("FILE")
                .help("File containing the raw message headers"),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .value_name("ID")
                .help("User id for sender-history lookups"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("FILE")
                .help("JSON file backing the behavior/trust store"),
        )
        .arg(
            Arg::new("sensitivity")
                .long("sensitivity")
                .value_name("LEVEL")
                .help("lenient, balanced or strict")
                .default_value("balanced"),
        )
        .arg(
            Arg::new("no-ml")
                .long("no-ml")
                .help("Disable the ML engine")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Emit the full analysis result as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        let config = PatternConfig::default();
        match config.to_file(path) {
            Ok(()) => {
                println!("Default configuration written to {}", path);
                return;
            }
            Err(e) => {
                eprintln!("Failed to write configuration: {}", e);
                process::exit(1);
            }
        }
    }

    let patterns = match matches.get_one::<String>("config") {
        Some(path) => match PatternConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration {}: {}", path, e);
                process::exit(1);
            }
        },
        None => PatternConfig::default(),
    };

    let sensitivity: Sensitivity = match matches.get_one::<String>("sensitivity").unwrap().parse() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let store: Arc<dyn BehaviorStore> = match matches.get_one::<String>("store") {
        Some(path) => match JsonFileStore::open(path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                eprintln!("Failed to open store {}: {}", path, e);
                process::exit(1);
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let mut analyzer_config = AnalyzerConfig {
        sensitivity,
        ..AnalyzerConfig::default()
    };
    if matches.get_flag("no-ml") {
        analyzer_config.enable_ml = false;
    }

    let body = match matches.get_one::<String>("body-file") {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Failed to read body file {}: {}", path, e);
                process::exit(1);
            }
        },
        None => String::new(),
    };
    let headers = match matches.get_one::<String>("headers-file") {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                eprintln!("Failed to read headers file {}: {}", path, e);
                process::exit(1);
            }
        },
        None => None,
    };

    let input = EmailInput {
        from: matches.get_one::<String>("from").unwrap().clone(),
        subject: matches.get_one::<String>("subject").unwrap().clone(),
        body,
        headers,
        user_id: matches.get_one::<String>("user").cloned(),
    };

    let analyzer = PhishingAnalyzer::new(patterns, store, analyzer_config);
    analyzer.initialize().await;
    let result = analyzer.analyze(&input).await;

    if matches.get_flag("json") {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize result: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Score:   {:.1} / 100", result.score);
    println!("Level:   {:?} ({})", result.risk_level, result.summary);
    println!("Elapsed: {} ms", result.processing_time_ms);
    println!();

    if result.findings.is_empty() {
        println!("No findings.");
    } else {
        println!("Findings:");
        for finding in &result.findings {
            let marker = match finding.severity {
                Severity::High => "!!",
                Severity::Medium => " !",
                Severity::Low => "  ",
            };
            println!("  {} [{:?}] {}", marker, finding.category, finding.text);
        }
    }

    println!();
    println!("Engine breakdown:");
    for (name, engine) in &result.breakdown {
        println!(
            "  {:<10} score {:>5.1}  weight {:>5.1}%",
            name, engine.score, engine.percentage
        );
    }
}
