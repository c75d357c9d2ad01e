use anyhow::Context;
use embassy_executor::{Executor, Spawner};
use env_logger::Builder;
use log::{LevelFilter, info};
use std::io::{BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::catalog::{Catalog, Restroom};
use crate::engine::types::{EngineCommandChannel, EngineCommandReceiver, EngineCommandSender, EngineEventChannel, EngineEventSender};
use crate::engine::{EngineCommand, EngineEvent, Fix, RankedRestroom};

mod catalog;
mod engine;
mod geo;

const HELP: &str = "commands:
  watch start | watch stop      manage the location watch
  fix LAT LNG                   feed a location fix
  fix-error MESSAGE             report a location provider failure
  campus NAME | campus -        select or clear the campus
  building NAME | building -    select or clear the building
  floor N | floor -             select or clear the floor
  confirm BUILDING FLOOR        answer a floor chooser
  pick N                        answer an ambiguous-candidate chooser
  dismiss                       close the open chooser or notice
  list [N]                      show the latest ranked restrooms
  quit";

fn describe(restroom: &Restroom) -> String {
    let mut out = format!("{} {}F {}", restroom.building, restroom.floor, restroom.attribute);
    if let Some(room) = &restroom.nearby_room {
        out.push_str(&format!(" (near {})", room));
    }
    if let Some(desc) = &restroom.description {
        out.push_str(&format!(" - {}", desc));
    }
    out
}

fn describe_ranked(entry: &RankedRestroom) -> String {
    let mut out = describe(&entry.restroom);
    if let Some(label) = &entry.floor_label {
        out.push_str(&format!(" [{}]", label));
    }
    match (entry.distance_m, entry.direction) {
        (Some(d), Some(dir)) => out.push_str(&format!(" ~{:.0} m {}", d, dir)),
        (Some(d), None) => out.push_str(&format!(" ~{:.0} m", d)),
        _ => {}
    }
    out
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Shell-side state: the candidate set of the open chooser and the latest
/// ranked list, kept so `pick N` and `list` can refer to them by index.
struct Shell {
    candidates: Vec<Restroom>,
    ranked: Vec<RankedRestroom>,
    entry_progress_open: bool,
}

impl Shell {
    fn new() -> Self {
        Shell {
            candidates: Vec::new(),
            ranked: Vec::new(),
            entry_progress_open: false,
        }
    }

    /// Finish an in-place entry progress line before printing anything else.
    fn end_progress_line(&mut self) {
        if self.entry_progress_open {
            println!();
            self.entry_progress_open = false;
        }
    }

    fn show_event(&mut self, event: EngineEvent) {
        if !matches!(event, EngineEvent::BuildingEntryPending { .. }) {
            self.end_progress_line();
        }
        match event {
            EngineEvent::BuildingsForCampus(buildings) => {
                println!("buildings: {}", buildings.join(", "));
            }
            EngineEvent::FloorsForBuilding(total) => {
                println!("floors: 1-{}", total);
            }
            EngineEvent::Resolved(restroom) => {
                println!("=> {}", describe(&restroom));
                if let Some(notes) = &restroom.notes {
                    println!("   note: {}", notes);
                }
            }
            EngineEvent::NoMatch => {
                println!("no match yet, refine the selection");
            }
            EngineEvent::Ambiguous(candidates) => {
                println!("multiple candidates, pick N:");
                for (i, restroom) in candidates.iter().enumerate() {
                    println!("  {}. {}", i + 1, describe(restroom));
                }
                self.candidates = candidates;
            }
            EngineEvent::BuildingEntryPending { building, remaining_ms } => {
                print!("\rentering {}... {:.1}s  ", building, remaining_ms as f64 / 1000.0);
                let _ = std::io::stdout().flush();
                self.entry_progress_open = true;
            }
            EngineEvent::BuildingEntryCancelled(building) => {
                println!("left {} before the entry was confirmed", building);
            }
            EngineEvent::BuildingEntryConfirmed { building, candidate } => {
                match candidate {
                    Some(restroom) => println!("entered {}, nearest: {}", building, describe(&restroom)),
                    None => println!("entered {}", building),
                }
                println!("confirm {} FLOOR to pick your floor, or dismiss", building);
            }
            EngineEvent::NearestBuildingChanged { building, inside } => {
                if inside {
                    println!("nearest building: {} (inside)", building);
                } else {
                    println!("nearest building: {}", building);
                }
            }
            EngineEvent::ListRanked(ranked) => {
                println!("{} ranked restrooms, `list` to show", ranked.len());
                self.ranked = ranked;
            }
            EngineEvent::NoRestroomInBuilding(building) => {
                println!("no restrooms recorded in {} (dismiss to close)", building);
            }
            EngineEvent::LocationUnavailable(reason) => {
                println!("location unavailable: {}", reason);
            }
            EngineEvent::FirstFixTimeout => {
                println!("no location fix yet, still waiting");
            }
        }
    }

    /// Returns false when the shell should exit.
    fn handle_line(&mut self, line: &str, commands: &EngineCommandSender) -> bool {
        self.end_progress_line();
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return true;
        };
        let args: Vec<&str> = parts.collect();

        let cmd = match (verb, args.as_slice()) {
            ("quit", _) | ("exit", _) => return false,
            ("help", _) => {
                println!("{}", HELP);
                return true;
            }
            ("watch", ["start"]) => Some(EngineCommand::StartWatch),
            ("watch", ["stop"]) => Some(EngineCommand::StopWatch),
            ("fix", [lat, lng]) => match (lat.parse::<f64>(), lng.parse::<f64>()) {
                (Ok(lat), Ok(lng)) => Some(EngineCommand::LocationFix(Fix::new(lat, lng, now_ms()))),
                _ => {
                    println!("usage: fix LAT LNG");
                    None
                }
            },
            ("fix-error", rest) if !rest.is_empty() => Some(EngineCommand::LocationError(rest.join(" "))),
            ("campus", ["-"]) => Some(EngineCommand::SelectCampus(String::new())),
            ("campus", rest) if !rest.is_empty() => Some(EngineCommand::SelectCampus(rest.join(" "))),
            ("building", ["-"]) => Some(EngineCommand::SelectBuilding(String::new())),
            ("building", rest) if !rest.is_empty() => Some(EngineCommand::SelectBuilding(rest.join(" "))),
            ("floor", ["-"]) => Some(EngineCommand::SelectFloor(None)),
            ("floor", [n]) => match n.parse::<i32>() {
                Ok(floor) => Some(EngineCommand::SelectFloor(Some(floor))),
                Err(_) => {
                    println!("usage: floor N | floor -");
                    None
                }
            },
            // The floor is the last token; the building name may contain spaces.
            ("confirm", rest) if rest.len() >= 2 => match rest[rest.len() - 1].parse::<i32>() {
                Ok(floor) => Some(EngineCommand::ConfirmFloorChoice {
                    building: rest[..rest.len() - 1].join(" "),
                    floor,
                }),
                Err(_) => {
                    println!("usage: confirm BUILDING FLOOR");
                    None
                }
            },
            ("pick", [n]) => match n.parse::<usize>() {
                Ok(n) if n >= 1 && n <= self.candidates.len() => Some(EngineCommand::PickFromCandidates(self.candidates[n - 1].clone())),
                _ => {
                    println!("pick 1-{}", self.candidates.len());
                    None
                }
            },
            ("dismiss", _) => Some(EngineCommand::DismissNotice),
            ("list", rest) => {
                let count = rest.first().and_then(|n| n.parse::<usize>().ok()).unwrap_or(10);
                if self.ranked.is_empty() {
                    println!("no ranked list yet");
                } else {
                    for (i, entry) in self.ranked.iter().take(count).enumerate() {
                        println!("  {}. {}", i + 1, describe_ranked(entry));
                    }
                }
                None
            }
            _ => {
                println!("unknown command, `help` for the list");
                None
            }
        };

        if let Some(cmd) = cmd {
            if commands.try_send(cmd).is_err() {
                println!("engine busy, command dropped");
            }
        }
        true
    }
}

fn embassy_init(spawner: Spawner, catalog: Catalog, command_rx: EngineCommandReceiver, event_tx: EngineEventSender) {
    let _ = spawner.spawn(engine::engine_task(catalog, command_rx, event_tx));
}

fn main() -> anyhow::Result<()> {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("campus_restroom_finder"), LevelFilter::Debug)
        .init();

    info!("Starting up");

    let data_dir = std::env::args().nth(1).unwrap_or_else(|| "data".to_string());
    let catalog = Catalog::load(&data_dir).with_context(|| format!("loading catalogs from {}", data_dir))?;

    let command_channel: &'static EngineCommandChannel = Box::leak(Box::new(EngineCommandChannel::new()));
    let event_channel: &'static EngineEventChannel = Box::leak(Box::new(EngineEventChannel::new()));

    let command_tx = command_channel.sender();
    let command_rx = command_channel.receiver();
    let event_tx = event_channel.sender();
    let event_rx = event_channel.receiver();

    // Spawn Embassy executor on a dedicated background thread
    let _embassy_handle = thread::Builder::new()
        .name("embassy-executor".to_string())
        .spawn(move || {
            // Leak the executor to satisfy the 'static lifetime required by run()
            let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
            executor.run(|spawner| embassy_init(spawner, catalog, command_rx, event_tx));
        })
        .context("failed to spawn embassy thread")?;

    // Stdin lines flow through a std channel so the main loop can keep
    // draining engine events while waiting for input.
    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("{}", HELP);
    let mut shell = Shell::new();
    loop {
        while let Ok(event) = event_rx.try_receive() {
            shell.show_event(event);
        }
        match line_rx.recv_timeout(Duration::from_millis(25)) {
            Ok(line) => {
                if !shell.handle_line(line.trim(), &command_tx) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("Shutting down");
    Ok(())
}
