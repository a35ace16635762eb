#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::Write;

use log::debug;
use tokio::runtime::Builder;

use dnstun::config;
use dnstun::server::start_tunnel_servers;

fn print_usage_and_exit(arg0: String) {
    eprintln!("Usage: {arg0} [--threads/-t N] [--dry-run/-d] <config filename> [config filename] [..]");
    std::process::exit(1);
}

fn main() {
    env_logger::builder()
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            let level_style = buf.default_level_style(record.level());
            // Session keys and payloads come from the network.
            let sanitized_args = format!("{}", record.args())
                .chars()
                .map(|c| {
                    if c.is_ascii_graphic() || c == ' ' {
                        c
                    } else {
                        '?'
                    }
                })
                .collect::<String>();

            writeln!(
                buf,
                "[{} {level_style}{}{level_style:#} {}] {}",
                timestamp,
                record.level(),
                record.target(),
                sanitized_args
            )
        })
        .init();

    let mut args: Vec<String> = std::env::args().collect();
    let arg0 = args.remove(0);
    let mut num_threads = 0usize;
    let mut dry_run = false;

    while !args.is_empty() && args[0].starts_with("-") {
        if args[0] == "--threads" || args[0] == "-t" {
            args.remove(0);
            if args.is_empty() {
                eprintln!("Missing threads argument.");
                print_usage_and_exit(arg0);
                return;
            }
            num_threads = match args.remove(0).parse::<usize>() {
                Ok(n) => n,
                Err(e) => {
                    eprintln!("Invalid thread count: {e}");
                    print_usage_and_exit(arg0);
                    return;
                }
            };
        } else if args[0] == "--dry-run" || args[0] == "-d" {
            args.remove(0);
            dry_run = true;
        } else {
            eprintln!("Invalid argument: {}", args[0]);
            print_usage_and_exit(arg0);
            return;
        }
    }

    if args.is_empty() {
        println!("No config specified, assuming loading from file config.dnstun.yaml");
        args.push("config.dnstun.yaml".to_string())
    }

    if dry_run {
        println!("Starting dry run.");
    }

    if num_threads == 0 {
        num_threads = std::cmp::max(
            2,
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        );
        debug!("Runtime threads: {num_threads}");
    } else {
        println!("Using custom thread count ({num_threads})");
    }

    let mut builder = if num_threads == 1 {
        Builder::new_current_thread()
    } else {
        let mut mt = Builder::new_multi_thread();
        mt.worker_threads(num_threads);
        mt
    };

    let runtime = match builder.enable_io().enable_time().build() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Could not build tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let configs = match config::load_configs(&args).await {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load tunnel configs: {e}\n");
                print_usage_and_exit(arg0);
                return;
            }
        };

        for config in configs.iter() {
            debug!("================================================================================");
            debug!("{config:#?}");
        }
        debug!("================================================================================");

        let tunnel_configs = match config::create_tunnel_configs(configs) {
            Ok(c) => c,
            Err(e) => {
                if dry_run {
                    eprintln!("Dry run failed, could not create tunnel configs: {e}\n");
                    std::process::exit(1);
                }
                eprintln!("Failed to create tunnel configs: {e}\n");
                print_usage_and_exit(arg0);
                return;
            }
        };

        if dry_run {
            println!("Finishing dry run, config parsed successfully.");
            return;
        }

        println!("\nStarting {} tunnel server(s)..", tunnel_configs.len());

        let _join_handles = match start_tunnel_servers(tunnel_configs).await {
            Ok(handles) => handles,
            Err(e) => {
                eprintln!("Failed to start tunnel servers: {e}");
                std::process::exit(1);
            }
        };

        futures::future::pending::<()>().await;
    });
}
