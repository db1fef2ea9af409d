use std::{fs, process};

use clap::Parser;

use adya_cli::{App, CheckArgs, Command, GenerateArgs};
use adya_core::{check, History, Op, Validity, Workload};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let app = App::parse();
    let code = match &app.command {
        Command::Check(args) => run_check(args),
        Command::Generate(args) => run_generate(args),
    };
    process::exit(code);
}

/// Exit code per verdict: 0 valid, 1 invalid, 2 unknown. Across several
/// files the worst verdict wins, with invalid worst.
fn run_check(args: &CheckArgs) -> i32 {
    let workload = Workload::from(args.workload);
    let options = args.options();
    let mut any_invalid = false;
    let mut any_unknown = false;

    for path in &args.files {
        let name = path.display();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                eprintln!("{name}: cannot read: {e}");
                any_unknown = true;
                continue;
            }
        };
        let ops: Vec<Op<String, i64>> = match serde_json::from_str(&contents) {
            Ok(ops) => ops,
            Err(e) => {
                eprintln!("{name}: cannot parse: {e}");
                any_unknown = true;
                continue;
            }
        };
        let history = match History::new(ops) {
            Ok(history) => history,
            Err(e) => {
                eprintln!("{name}: malformed history: {e:?}");
                any_unknown = true;
                continue;
            }
        };

        match check(&history, workload, &options) {
            Ok(result) => {
                match result.valid {
                    Validity::Invalid => any_invalid = true,
                    Validity::Unknown => any_unknown = true,
                    Validity::Valid => {}
                }
                if args.json {
                    match serde_json::to_string(&result) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("{name}: cannot serialize result: {e}");
                            any_unknown = true;
                        }
                    }
                } else {
                    let verdict = match result.valid {
                        Validity::Valid => "VALID",
                        Validity::Invalid => "INVALID",
                        Validity::Unknown => "UNKNOWN",
                    };
                    println!("{name}: {verdict}");
                    for tag in &result.anomaly_types {
                        let count = result.anomalies.get(tag).map_or(0, Vec::len);
                        println!("  {tag}: {count}");
                    }
                    for model in &result.impossible_models {
                        println!("  impossible: {model}");
                    }
                }
            }
            Err(e) => {
                eprintln!("{name}: analysis aborted: {e:?}");
                any_unknown = true;
            }
        }
    }

    if any_invalid {
        1
    } else if any_unknown {
        2
    } else {
        0
    }
}

fn run_generate(args: &GenerateArgs) -> i32 {
    if let Err(e) = fs::create_dir_all(&args.output_dir) {
        eprintln!("cannot create output directory: {e}");
        return 2;
    }

    let histories = adya_testgen::generate_mult_histories(
        Workload::from(args.workload),
        args.n_hist,
        args.n_process,
        args.n_key,
        args.n_txn,
        args.n_mop,
    );

    for history in &histories {
        let path = args.output_dir.join(format!("{}.json", history.id()));
        let file = match fs::File::create(&path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("cannot create {}: {e}", path.display());
                return 2;
            }
        };
        if let Err(e) = serde_json::to_writer_pretty(file, history.ops()) {
            eprintln!("cannot write {}: {e}", path.display());
            return 2;
        }
    }

    println!(
        "generated {} histories in {}",
        histories.len(),
        args.output_dir.display()
    );
    0
}
