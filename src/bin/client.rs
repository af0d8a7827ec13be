// Load-generating client for the FIFO server.
//
// Sends a fixed number of simulated-work requests at a steady rate over one
// TCP connection and prints every acknowledgment as it comes back. Useful for
// driving the server by hand:
//
//   cargo run --bin client -- -n 20 -a 10 -s 0.05 2222

use fifo_server::request::{Request, Response, Status, RESPONSE_SIZE};
use fifo_server::timing::{sleepwait, Timestamp};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::process;
use std::thread;
use std::time::Duration;

const USAGE: &str = "Usage: client -n <num requests> -a <rate per second> -s <service seconds> <port_number>";

struct ClientOptions {
    count: u64,
    /// Submission rate in requests per second.
    rate: f64,
    /// Simulated service length carried by every request.
    service: Duration,
    port: u16,
}

fn parse_options<I>(args: I) -> Result<ClientOptions, String>
where
    I: IntoIterator<Item = String>,
{
    let mut count: Option<u64> = None;
    let mut rate: Option<f64> = None;
    let mut service: Option<Duration> = None;
    let mut port: Option<u16> = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-n" => {
                let value = args.next().ok_or("option -n requires a value")?;
                count = Some(
                    value
                        .parse::<u64>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or(format!("invalid request count: {value}"))?,
                );
            }
            "-a" => {
                let value = args.next().ok_or("option -a requires a value")?;
                rate = Some(
                    value
                        .parse::<f64>()
                        .ok()
                        .filter(|r| *r > 0.0)
                        .ok_or(format!("invalid arrival rate: {value}"))?,
                );
            }
            "-s" => {
                let value = args.next().ok_or("option -s requires a value")?;
                let secs = value
                    .parse::<f64>()
                    .ok()
                    .filter(|s| *s >= 0.0)
                    .ok_or(format!("invalid service time: {value}"))?;
                service = Some(Duration::from_secs_f64(secs));
            }
            other if port.is_none() => {
                port = Some(
                    other
                        .parse::<u16>()
                        .map_err(|_| format!("invalid port number: {other}"))?,
                );
            }
            other => return Err(format!("unexpected argument: {other}")),
        }
    }

    Ok(ClientOptions {
        count: count.ok_or("missing -n <num requests>")?,
        rate: rate.ok_or("missing -a <rate per second>")?,
        service: service.ok_or("missing -s <service seconds>")?,
        port: port.ok_or("missing port number")?,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = match parse_options(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };

    let stream = TcpStream::connect(("127.0.0.1", options.port))?;
    println!(
        "INFO: connected, sending {} requests at {}/s with {:.6}s service time",
        options.count,
        options.rate,
        options.service.as_secs_f64()
    );

    // Collect acknowledgments concurrently so a slow server never backs up
    // the submission schedule.
    let mut response_stream = stream.try_clone()?;
    let expected = options.count;
    let reader = thread::spawn(move || {
        let mut accepted = 0u64;
        let mut rejected = 0u64;
        let mut buf = [0u8; RESPONSE_SIZE];
        for _ in 0..expected {
            if response_stream.read_exact(&mut buf).is_err() {
                break;
            }
            let response = Response::decode(&buf);
            let received_at = Timestamp::now();
            match response.status {
                Status::Accepted => {
                    accepted += 1;
                    println!("A{}:{:.6}", response.req_id, received_at.as_secs_f64());
                }
                Status::Rejected => {
                    rejected += 1;
                    println!("N{}:{:.6}", response.req_id, received_at.as_secs_f64());
                }
            }
        }
        (accepted, rejected)
    });

    let gap = Duration::from_secs_f64(1.0 / options.rate);
    let mut sender = stream.try_clone()?;
    for id in 0..options.count {
        let request = Request {
            id,
            timestamp: Timestamp::now(),
            length: options.service,
        };
        sender.write_all(&request.encode())?;
        if id + 1 < options.count {
            sleepwait(gap);
        }
    }

    let (accepted, rejected) = reader.join().expect("response reader panicked");
    println!(
        "INFO: done. accepted = {accepted}, rejected = {rejected}, sent = {}",
        options.count
    );
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}
