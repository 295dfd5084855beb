use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use lodge::model::{DAY_MS, Ms, parse_day};
use tokio_postgres::{Client, Config, NoTls};
use ulid::Ulid;

async fn connect(host: &str, port: u16) -> Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(format!("bench_{}", Ulid::new()))
        .user("lodge")
        .password(std::env::var("LODGE_PASSWORD").unwrap_or_else(|_| "lodge".into()));

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn epoch() -> Ms {
    parse_day("2030-01-01").expect("valid date")
}

/// A hotel with one room type and one guest, ready to take bookings.
struct Property {
    room: Ulid,
    user: Ulid,
}

async fn setup_property(client: &Client, units: u32) -> Property {
    let (hotel, room, user) = (Ulid::new(), Ulid::new(), Ulid::new());
    client
        .batch_execute(&format!(
            "INSERT INTO hotels (id, name, location) VALUES ('{hotel}', 'Bench Inn', 'Porto')"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, hotel_id, room_type, price_per_night, max_guests, units) \
             VALUES ('{room}', '{hotel}', 'double', 10000, 2, {units})"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO users (id, email, full_name) VALUES ('{user}', 'bench-{user}@example.com', 'Bench Guest')"
        ))
        .await
        .unwrap();
    Property { room, user }
}

/// Book night `night` (counted from 2030-01-01) on the property's room.
async fn book_night(client: &Client, p: &Property, night: i64) -> Result<(), tokio_postgres::Error> {
    let id = Ulid::new();
    let check_in = epoch() + night * DAY_MS;
    let check_out = check_in + DAY_MS;
    client
        .batch_execute(&format!(
            "INSERT INTO bookings (id, room_id, user_id, check_in, check_out) \
             VALUES ('{id}', '{}', '{}', {check_in}, {check_out})",
            p.room, p.user
        ))
        .await
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port).await;
    let property = setup_property(&client, 1).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for night in 0..n as i64 {
        let t = Instant::now();
        book_night(&client, &property, night).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(host: &str, port: u16) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let property = setup_property(&client, 5).await;
            for night in 0..n_per_task {
                book_night(&client, &property, night).await.unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Contended room: many clients race for the same nights of one single-unit room.
async fn phase3_contention(host: &str, port: u16) {
    let client = connect(host, port).await;
    let property = Arc::new(setup_property(&client, 1).await);
    let client = Arc::new(client);

    let n_tasks = 20;
    let nights = 50;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let (client, property) = (client.clone(), property.clone());
        let (won, lost) = (won.clone(), lost.clone());
        handles.push(tokio::spawn(async move {
            for night in 0..nights {
                match book_night(&client, &property, night).await {
                    Ok(()) => won.fetch_add(1, Ordering::Relaxed),
                    Err(_) => lost.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let won = won.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks racing for {nights} nights: {won} booked, {} rejected in {:.2}s",
        lost.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, nights as usize, "each night must be sold exactly once");
}

async fn phase4_read_under_load(host: &str, port: u16) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for _ in 0..5 {
        let host = host.to_string();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let property = setup_property(&client, 10).await;
            let mut night = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let _ = book_night(&client, &property, night % 3000).await;
                night += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for _ in 0..n_readers {
        let host = host.to_string();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let property = setup_property(&client, 2).await;
            for night in (0..100).step_by(2) {
                book_night(&client, &property, night).await.unwrap();
            }

            let (from, to) = (epoch(), epoch() + 365 * DAY_MS);
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                client
                    .batch_execute(&format!(
                        "SELECT * FROM availability WHERE room_id = '{}' AND check_in >= {from} AND check_out <= {to}",
                        property.room
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

async fn phase5_connection_storm(host: &str, port: u16) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let property = setup_property(&client, 10).await;
            for night in 0..ops_per_conn {
                book_night(&client, &property, night).await.unwrap();
            }
            client.batch_execute("SELECT * FROM dashboard").await.unwrap();
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("LODGE_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("LODGE_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid LODGE_PORT");

    println!("=== lodge stress benchmark ===");
    println!("target: {host}:{port}\n");

    // Every connection gets its own tenant unless a phase shares a client.

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent(&host, port).await;

    println!("\n[phase 3] double-booking contention");
    phase3_contention(&host, port).await;

    println!("\n[phase 4] availability latency under write load");
    phase4_read_under_load(&host, port).await;

    println!("\n[phase 5] connection storm");
    phase5_connection_storm(&host, port).await;

    println!("\n=== benchmark complete ===");
}
