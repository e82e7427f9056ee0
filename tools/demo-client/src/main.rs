// Demo and load client for the campus gate-pass service.
// Grounded on the teacher's `tools/loadtest`: a clap-derived CLI, a
// reqwest::blocking client, and an atomic `Counters` struct printed on a
// fixed tick interval during load mode.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "campus-gatepass-demo-client")]
#[command(about = "Demo and load client for the campus gate-pass service")]
struct Args {
    /// Server base URL
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Replay the last minted token against /verify after the demo run
    #[arg(long, default_value_t = false)]
    replay: bool,

    /// Run the self-service daily-entry load generator instead of the demo walk
    #[arg(long, default_value_t = false)]
    load: bool,

    /// Requests per second in load mode
    #[arg(long, default_value_t = 10)]
    rate: u32,

    /// Duration in seconds in load mode
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Latitude used by the load generator (defaults to the seeded campus center)
    #[arg(long, default_value_t = 31.7768)]
    lat: f64,

    /// Longitude used by the load generator
    #[arg(long, default_value_t = 77.0144)]
    lon: f64,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: String,
}

#[derive(Serialize)]
struct CreatePassRequest {
    reason: String,
    direction: String,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Deserialize)]
struct PassOut {
    id: u64,
    state: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct VerifyResponse {
    result: String,
    detail: String,
}

fn login(client: &reqwest::blocking::Client, url: &str, username: &str, password: &str) -> String {
    let resp = client
        .post(format!("{url}/auth/login"))
        .form(&[("username", username), ("password", password)])
        .send()
        .unwrap_or_else(|e| {
            eprintln!("login request failed: {e}");
            std::process::exit(1);
        });
    if !resp.status().is_success() {
        eprintln!("login as {username} failed: {}", resp.status());
        std::process::exit(1);
    }
    resp.json::<LoginResponse>().expect("valid login response").access_token
}

fn run_demo(client: &reqwest::blocking::Client, args: &Args) {
    println!("=== Campus Gate-Pass Demo ===");
    println!("Target: {}", args.url);

    let student_token = login(client, &args.url, "STU-0001", "student123");
    println!("1. Logged in as student STU-0001");

    let pass: PassOut = client
        .post(format!("{}/passes", args.url))
        .bearer_auth(&student_token)
        .json(&CreatePassRequest {
            reason: "Medical appointment".to_string(),
            direction: "entry".to_string(),
            lat: None,
            lon: None,
        })
        .send()
        .and_then(|r| r.json())
        .expect("pass creation succeeds");
    println!("2. Created pass #{} (state={})", pass.id, pass.state);

    let admin_token = login(client, &args.url, "Dean Verma", "admin123");
    println!("3. Logged in as admin");

    let approved: PassOut = client
        .post(format!("{}/passes/{}/approve", args.url, pass.id))
        .bearer_auth(&admin_token)
        .send()
        .and_then(|r| r.json())
        .expect("approval succeeds");
    let token = approved.token.expect("approved pass carries a token");
    println!("4. Approved pass #{} (state={})", approved.id, approved.state);

    let guard_token = login(client, &args.url, "Gate Guard", "guard123");
    println!("5. Logged in as guard");

    let form = reqwest::blocking::multipart::Form::new().text("token", token.clone());
    let verify: VerifyResponse = client
        .post(format!("{}/verify", args.url))
        .bearer_auth(&guard_token)
        .multipart(form)
        .send()
        .and_then(|r| r.json())
        .expect("verify call succeeds");
    println!("6. Scan result: {} ({})", verify.result, verify.detail);

    if args.replay {
        let form = reqwest::blocking::multipart::Form::new().text("token", token);
        let replay: VerifyResponse = client
            .post(format!("{}/verify", args.url))
            .bearer_auth(&guard_token)
            .multipart(form)
            .send()
            .and_then(|r| r.json())
            .expect("replay call succeeds");
        println!("7. Replay result: {} ({})", replay.result, replay.detail);
    }
}

struct Counters {
    sent: AtomicU64,
    ok: AtomicU64,
    denied: AtomicU64,
    error: AtomicU64,
}

fn run_load(client: &reqwest::blocking::Client, args: &Args) {
    println!("=== Campus Gate-Pass Daily-Entry Load Generator ===");
    let token = login(client, &args.url, "STU-0001", "student123");

    let counters = Arc::new(Counters {
        sent: AtomicU64::new(0),
        ok: AtomicU64::new(0),
        denied: AtomicU64::new(0),
        error: AtomicU64::new(0),
    });

    let interval = Duration::from_micros(1_000_000 / args.rate.max(1) as u64);
    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let start = Instant::now();
    let mut tick = 0u64;

    #[derive(Serialize)]
    struct DailyEntryRequest {
        direction: &'static str,
        lat: f64,
        lon: f64,
    }

    while Instant::now() < deadline {
        counters.sent.fetch_add(1, Ordering::Relaxed);
        let resp = client
            .post(format!("{}/passes/daily-entry", args.url))
            .bearer_auth(&token)
            .json(&DailyEntryRequest {
                direction: "entry",
                lat: args.lat,
                lon: args.lon,
            })
            .send();
        match resp {
            Ok(r) if r.status().is_success() => {
                counters.ok.fetch_add(1, Ordering::Relaxed);
            }
            Ok(r) if r.status() == reqwest::StatusCode::FORBIDDEN => {
                counters.denied.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {
                counters.error.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                counters.error.fetch_add(1, Ordering::Relaxed);
            }
        }

        tick += 1;
        if tick % 50 == 0 {
            println!(
                "  [{:.1}s] sent={} ok={} denied={} err={}",
                start.elapsed().as_secs_f64(),
                counters.sent.load(Ordering::Relaxed),
                counters.ok.load(Ordering::Relaxed),
                counters.denied.load(Ordering::Relaxed),
                counters.error.load(Ordering::Relaxed),
            );
        }

        let target = Duration::from_micros(tick * interval.as_micros() as u64);
        let actual = start.elapsed();
        if actual < target {
            std::thread::sleep(target - actual);
        }
    }

    println!("\n=== Results ===");
    println!("sent:   {}", counters.sent.load(Ordering::Relaxed));
    println!("ok:     {}", counters.ok.load(Ordering::Relaxed));
    println!("denied: {}", counters.denied.load(Ordering::Relaxed));
    println!("error:  {}", counters.error.load(Ordering::Relaxed));
}

fn main() {
    let args = Args::parse();
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("http client builds");

    if args.load {
        run_load(&client, &args);
    } else {
        run_demo(&client, &args);
    }
}
