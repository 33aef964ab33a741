use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use log::info;
use nest_core::anniversary::Countdown;
use nest_core::chat::timeline;
use nest_core::{Member, NestApp, NestConfig, NestError, TimelineEntry};

#[derive(Parser)]
#[command(author, version, about = "Our nest: a shared space for two")]
struct Cli {
    /// Directory of the persistent store
    #[arg(long, env = "NEST_DATA_DIR", default_value = "nest_data", global = true)]
    data_dir: PathBuf,

    /// Keep everything in memory for this run
    #[arg(long, global = true)]
    memory: bool,

    /// Member code to log in as
    #[arg(long, short, env = "NEST_USER", global = true)]
    user: Option<String>,

    /// Shared secret
    #[arg(long, env = "NEST_SECRET", hide_env_values = true, global = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show both profiles
    Profile,
    /// Show your shout-out, or leave one for your partner
    Shoutout {
        text: Option<String>,
    },
    /// The shared chat
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
    /// "100 times" counters
    Times {
        #[command(subcommand)]
        action: TimesAction,
    },
    /// Anniversary calendar
    Anniv {
        #[command(subcommand)]
        action: AnnivAction,
    },
}

#[derive(Subcommand)]
enum ChatAction {
    /// Send a message
    Send { text: String },
    /// Print the conversation and mark incoming messages read
    Read,
}

#[derive(Subcommand)]
enum TimesAction {
    List,
    Add { text: String },
    Inc { id: String },
    Dec { id: String },
    Rm { id: String },
}

#[derive(Subcommand)]
enum AnnivAction {
    List,
    /// Add an anniversary; DATE is YYYY-MM-DD
    Add { title: String, date: String },
    Rm { id: String },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), NestError> {
    let config = if cli.memory {
        NestConfig::default()
    } else {
        NestConfig::persistent(&cli.data_dir)
    };
    let app = NestApp::open(config)?;

    let user = cli.user.ok_or(NestError::NotSignedIn)?;
    let secret = cli.secret.unwrap_or_default();
    let me = app.auth().login(&user, &secret)?.member;
    info!("Logged in as {me}");

    match cli.command {
        Command::Profile => show_profiles(&app, me),
        Command::Shoutout { text: Some(text) } => {
            app.profiles().send_shoutout(me, &text)?;
            println!("Left a shout-out for {}", me.partner());
            Ok(())
        }
        Command::Shoutout { text: None } => {
            println!("{}", app.profiles().shoutout_for(me)?);
            Ok(())
        }
        Command::Chat { action } => chat(&app, me, action),
        Command::Times { action } => times(&app, me, action),
        Command::Anniv { action } => anniversaries(&app, action),
    }
}

fn show_profiles(app: &NestApp, me: Member) -> Result<(), NestError> {
    for member in [me, me.partner()] {
        let Some(profile) = app.profiles().get(member)? else {
            println!("{member}: no profile");
            continue;
        };
        println!("{member}  {}  birthday {}", profile.name, profile.birthday);
        println!("     \"{}\"", app.profiles().shoutout_for(member)?);
    }
    Ok(())
}

fn chat(app: &NestApp, me: Member, action: ChatAction) -> Result<(), NestError> {
    let chat = app.chat();
    match action {
        ChatAction::Send { text } => {
            chat.send(me, &text)?;
        }
        ChatAction::Read => {
            for entry in timeline(&chat.messages()?) {
                match entry {
                    TimelineEntry::Marker(at) => {
                        println!("--- {} ---", at.with_timezone(&Local).format("%Y-%m-%d %H:%M"))
                    }
                    TimelineEntry::Message(m) => {
                        let from = if m.is_from(me) { "me" } else { m.user.id.as_str() };
                        let unread = if m.is_unread_by(me) { " *" } else { "" };
                        println!("[{from}] {}{unread}", m.text);
                    }
                }
            }
            let read = chat.mark_read(me)?;
            if read > 0 {
                info!("Marked {read} messages read");
            }
        }
    }
    Ok(())
}

fn times(app: &NestApp, me: Member, action: TimesAction) -> Result<(), NestError> {
    let times = app.times();
    match action {
        TimesAction::List => {
            for item in times.list()? {
                println!("{}  {:>3}x  {}  (by {})", item.id, item.count, item.text, item.created_by);
            }
            println!("total: {}", times.total_count()?);
        }
        TimesAction::Add { text } => {
            let item = times.add(me, &text)?;
            println!("{}", item.id);
        }
        TimesAction::Inc { id } => println!("{}", times.increment(&id)?),
        TimesAction::Dec { id } => println!("{}", times.decrement(&id)?),
        TimesAction::Rm { id } => {
            times.remove(&id)?;
        }
    }
    Ok(())
}

fn anniversaries(app: &NestApp, action: AnnivAction) -> Result<(), NestError> {
    let calendar = app.anniversaries();
    match action {
        AnnivAction::List => {
            let today = Utc::now().date_naive();
            for a in calendar.list()? {
                let when = match a.countdown(today) {
                    Countdown::Upcoming(0) => "today".to_string(),
                    Countdown::Upcoming(days) => format!("in {days} days"),
                    Countdown::Elapsed(days) => format!("{days} days ago"),
                };
                println!("{}  {}  {}  ({when})", a.id, a.date, a.title);
            }
        }
        AnnivAction::Add { title, date } => {
            let a = calendar.add(&title, &date)?;
            println!("{}", a.id);
        }
        AnnivAction::Rm { id } => {
            calendar.remove(&id)?;
        }
    }
    Ok(())
}
