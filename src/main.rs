mod app;
mod backend;
mod config;
mod error;
mod health;
mod messages;
#[cfg(test)]
mod testing;
mod ui;

use std::rc::Rc;

use tokio::io::{AsyncBufReadExt, BufReader};

use app::{Coordinator, SessionEvent, SessionSettings};
use backend::VoiceServerClient;
use config::Config;
use health::HealthMonitor;
use ui::console::{self, Command};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    log::info!("Jarvis desk starting");

    let config = Config::load_or_create();

    // Everything runs on one thread; the coordinator relies on it.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let client = Rc::new(VoiceServerClient::new(
        &config.server_url,
        config.connect_timeout(),
    )?);
    log::info!("Using voice server at {}", client.base_url());

    let monitor = Rc::new(HealthMonitor::new(
        Rc::clone(&client),
        config.health.retry_policy(),
    ));
    let health = monitor.handle();

    let (event_tx, event_rx) = async_channel::unbounded::<SessionEvent>();
    let coordinator = Rc::new(
        Coordinator::new(client, SessionSettings::from_config(&config))
            .with_health(health.clone())
            .with_observer(event_tx),
    );

    // Poll the voice server in the background
    {
        let monitor = Rc::clone(&monitor);
        tokio::task::spawn_local(async move { monitor.run().await });
    }

    // Forward reachability transitions to the session
    {
        let coordinator = Rc::clone(&coordinator);
        let mut status_rx = monitor.subscribe();
        tokio::task::spawn_local(async move {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                coordinator.set_reachable(status.reachable, status.listening);
            }
        });
    }

    // Render session events as they happen
    tokio::task::spawn_local(async move {
        while let Ok(event) = event_rx.recv().await {
            console::render_event(&event);
        }
    });

    println!("Jarvis desk: type `help` for commands");
    println!("-- {}", console::status_line(coordinator.state()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match console::parse_command(&line) {
            Command::Action(action) => {
                if !console::is_enabled(action, coordinator.affordances()) {
                    println!(
                        "{action:?} is not available: {}",
                        coordinator.state().status_text()
                    );
                    continue;
                }
                // Spawned so a slow capture never blocks the prompt; the
                // coordinator rejects overlapping requests itself.
                let coordinator = Rc::clone(&coordinator);
                tokio::task::spawn_local(async move {
                    let delta = coordinator.dispatch(action).await;
                    log::debug!("{action:?}: {:?} -> {:?}", delta.before, delta.after);
                });
            }
            Command::Log => console::print_log(&coordinator.messages()),
            Command::Status => {
                console::print_status(
                    coordinator.state(),
                    &health.status(),
                    coordinator.last_message().as_ref(),
                );
                log::debug!(
                    "{} messages logged, request in flight: {}",
                    coordinator.message_count(),
                    coordinator.is_busy()
                );
            }
            Command::Retry => health.retry_now(),
            Command::Help => console::print_help(),
            Command::Quit => break,
            Command::Empty => {}
            Command::Unknown(word) => {
                println!("Unknown command: {word}");
                console::print_help();
            }
        }
    }

    log::info!("Jarvis desk exiting");
    Ok(())
}
