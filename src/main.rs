use std::process::exit;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sweep::calendar::{self, MonthWindow};
use sweep::config::{self, Config};
use sweep::ledger::Ledger;
use sweep::model::{ActivityId, UnitId, UserId};
use sweep::service;

fn main() {
    // .env first so RUST_LOG set there reaches the filter
    config::load_dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let config = Config::from_env();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage();
        exit(1);
    }

    match args[1].as_str() {
        "serve" => {
            let config = Config {
                port: parse_port(&args[2..]).unwrap_or(config.port),
                ..config
            };
            let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| fail(e));
            if let Err(e) = runtime.block_on(sweep::web::serve(config)) {
                fail(e);
            }
        }
        "check" => {
            if args.len() < 4 {
                eprintln!("Usage: sweep check <activity> <YYYY-MM-DD>");
                exit(1);
            }
            let ledger = load(&config);
            let activity: ActivityId = parse_id(&args[2], "activity");
            let resp = service::check_eligibility(&ledger, activity, &args[3]);
            print_json(&resp.unwrap_or_else(|e| fail(e)));
        }
        "mark" => {
            if args.len() < 4 {
                eprintln!("Usage: sweep mark <activity> <YYYY-MM-DD> [--assign USER]");
                exit(1);
            }
            let mut ledger = load(&config);
            let activity: ActivityId = parse_id(&args[2], "activity");
            let assignee: Option<UserId> =
                parse_flag(&args[4..], "--assign").map(|v| parse_id(&v, "user"));
            let now = chrono::Local::now().naive_local();
            let resp = service::mark_completed_day(
                &mut ledger,
                activity,
                &args[3],
                assignee,
                None,
                now,
                &config.slots,
            )
            .unwrap_or_else(|e| fail(e));
            if resp.ok
                && let Err(e) = ledger.save(&config.data_dir)
            {
                fail(e);
            }
            print_json(&resp);
            if !resp.ok {
                exit(2);
            }
        }
        "calendar" => {
            if args.len() < 5 {
                eprintln!("Usage: sweep calendar <activity> <year> <month>");
                exit(1);
            }
            let ledger = load(&config);
            let activity: ActivityId = parse_id(&args[2], "activity");
            let (year, month) = parse_year_month(&args[3], &args[4]);
            let grid = service::project_month(&ledger, activity, year, month, &config.slots);
            print_json(&grid.unwrap_or_else(|e| fail(e)));
        }
        "report" => {
            if args.len() < 4 {
                eprintln!("Usage: sweep report <year> <month> [unit]");
                exit(1);
            }
            let ledger = load(&config);
            let (year, month) = parse_year_month(&args[2], &args[3]);
            let unit: Option<UnitId> = args.get(4).map(|v| parse_id(v, "unit"));
            let rows = MonthWindow::new(year, month)
                .and_then(|w| calendar::performance_report(&ledger, &w, unit, &config.slots))
                .unwrap_or_else(|e| fail(e));
            print_json(&rows);
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            usage();
            exit(1);
        }
    }
}

fn usage() {
    eprintln!("Usage: sweep <command> [args...]");
    eprintln!("Commands:");
    eprintln!("  serve [-p PORT]                          Start the JSON API (default port 3000)");
    eprintln!("  check <activity> <date>                  Can the activity be completed on date?");
    eprintln!("  mark <activity> <date> [--assign USER]   Mark the day as completed");
    eprintln!("  calendar <activity> <year> <month>       Print the month calendar");
    eprintln!("  report <year> <month> [unit]             Expected vs actual per activity");
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {e}");
    exit(1);
}

fn load(config: &Config) -> Ledger {
    Ledger::load(&config.data_dir).unwrap_or_else(|e| fail(e))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => fail(e),
    }
}

fn parse_id(s: &str, what: &str) -> u64 {
    s.parse().unwrap_or_else(|_| {
        eprintln!("Invalid {what} id: {s}");
        exit(1);
    })
}

fn parse_year_month(year: &str, month: &str) -> (i32, u32) {
    match (year.parse(), month.parse()) {
        (Ok(y), Ok(m)) => (y, m),
        _ => {
            eprintln!("Invalid month: {year}-{month}");
            exit(1);
        }
    }
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn parse_port(args: &[String]) -> Option<u16> {
    parse_flag(args, "-p").map(|v| {
        v.parse().unwrap_or_else(|_| {
            eprintln!("Invalid port: {v}");
            exit(1);
        })
    })
}
