use std::io::{self, Write};
use std::process::ExitCode;
use chrono::Utc;
use clap::Parser;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use uuid::Uuid;
use satlog::parser::{self, Command};
use satlog::query::{ListParams, QueryResult};
use satlog::{TelemetryRecord, TelemetrySample};

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Ground station console for satlog", long_about = None)]
struct Args {
    #[clap(long, default_value = "http://127.0.0.1:8000")]
    server: String,
}

struct Station {
    client: Client,
    base: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    print_banner();

    let station = Station {
        client: Client::new(),
        base: format!("{}/telemetry", args.server.trim_end_matches('/')),
    };

    match station.client.get(&station.base).query(&[("limit", "1")]).send().await {
        Ok(_) => println!("[\u{2713}] Connected to satlog at {}!", args.server),
        Err(_) => {
            println!("[\u{2717}] Ground Station Offline: could not reach {}.", args.server);
            println!("    Make sure to run 'cargo run --release --bin satlog' in another terminal.");
            return ExitCode::FAILURE;
        }
    }
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("satlog> ");
        if io::stdout().flush().is_err() { break; }
        buffer.clear();

        match stdin.read_line(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if buffer.trim().is_empty() { continue; }

        match parser::parse_command(&buffer) {
            Ok(Command::Exit) => break,
            Ok(cmd) => {
                if let Err(e) = station.execute(cmd).await {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if buffer.to_uppercase().starts_with("INGEST") {
                    println!("    \u{2139}\u{fe0f}  Hint: Try 'INGEST \"SAT-1\" ALT 400.5 VEL 7.6 STATUS \"healthy\"'");
                } else if buffer.to_uppercase().starts_with("LIST") {
                    println!("    \u{2139}\u{fe0f}  Hint: Clauses go in order: SAT, STATUS, FROM, TO, LIMIT, OFFSET");
                }
            }
        }
    }
    ExitCode::SUCCESS
}

fn print_banner() {
    println!("\n==================================================");
    println!("   satlog Ground Station Console");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. INGEST:  INGEST \"SAT-1\" ALT 400.5 VEL 7.6 [STATUS \"healthy\"] [AT 2026-02-23T12:00:00Z]");
    println!("2. LIST:    LIST [SAT \"SAT-1\"] [STATUS \"healthy\"] [FROM <ts>] [TO <ts>] [LIMIT 100] [OFFSET 0]");
    println!("3. GET:     GET 'uuid'");
    println!("4. DELETE:  DELETE 'uuid'");
    println!("5. EXIT:    Quit\n");
}

fn print_record(record: &TelemetryRecord) {
    println!(
        "  \u{2022} {} | {:<12} | {:>10.2} km | {:>7.3} km/s | {:<8} | {}",
        record.id,
        record.satellite_id,
        record.altitude,
        record.velocity,
        record.status.to_uppercase(),
        record.timestamp.to_rfc3339(),
    );
}

impl Station {
    async fn execute(&self, cmd: Command) -> Result<(), String> {
        match cmd {
            Command::Help => { print_help(); Ok(()) },
            Command::Ingest { satellite_id, altitude, velocity, status, at } => {
                let sample = TelemetrySample {
                    satellite_id,
                    // Stamp with the console's clock when no time is given
                    timestamp: at.unwrap_or_else(|| Utc::now().to_rfc3339()),
                    altitude,
                    velocity,
                    status: status.unwrap_or_else(|| "healthy".to_string()),
                };
                self.ingest(&sample).await
            },
            Command::List { params } => self.list(&params).await,
            Command::Get { id } => self.get(id).await,
            Command::Delete { id } => self.delete(id).await,
            Command::Exit => Ok(()),
        }
    }

    // --- NETWORK HANDLERS ---

    async fn ingest(&self, sample: &TelemetrySample) -> Result<(), String> {
        let resp = self.client.post(&self.base).json(sample).send().await.map_err(|e| e.to_string())?;
        let record: TelemetryRecord = expect_ok(resp).await?;
        println!("[\u{2713} OK] Stored ID: {}", record.id);
        print_record(&record);
        Ok(())
    }

    async fn list(&self, params: &ListParams) -> Result<(), String> {
        let resp = self.client.get(&self.base).query(params).send().await.map_err(|e| e.to_string())?;
        let page: QueryResult = expect_ok(resp).await?;

        println!("\nShowing {} of {} matches (offset {}, limit {}):", page.data.len(), page.total, page.offset, page.limit);
        for record in &page.data {
            print_record(record);
        }
        println!();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<(), String> {
        let resp = self.client.get(format!("{}/{}", self.base, id)).send().await.map_err(|e| e.to_string())?;
        if resp.status() == StatusCode::NOT_FOUND {
            println!("[\u{2717}] ID Not Found.");
            return Ok(());
        }
        let record: TelemetryRecord = expect_ok(resp).await?;
        print_record(&record);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), String> {
        let resp = self.client.delete(format!("{}/{}", self.base, id)).send().await.map_err(|e| e.to_string())?;
        if resp.status() == StatusCode::NOT_FOUND {
            println!("[\u{2717}] ID Not Found.");
            return Ok(());
        }
        let _: Value = expect_ok(resp).await?;
        println!("[\u{2713} OK] Deleted ID: {}", id);
        Ok(())
    }
}

/// Decodes a success body, or turns the server's `detail` into an error line.
async fn expect_ok<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, String> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(|e| format!("Malformed response: {}", e));
    }

    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let detail = match &body["detail"] {
        Value::Array(fields) => fields
        .iter()
        .map(|f| format!("{} {}", f["field"].as_str().unwrap_or("?"), f["message"].as_str().unwrap_or("")))
        .collect::<Vec<_>>()
        .join("; "),
        Value::String(s) => s.clone(),
        _ => "no detail".to_string(),
    };
    Err(format!("Server Rejected Request ({}): {}", status, detail))
}
