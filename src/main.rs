use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use inquire::InquireError;
use tracing_subscriber::EnvFilter;

mod answerer;
mod catalog;
mod classifier;
mod cli;
mod config;
mod context;
mod errors;
mod genre;
mod inference;
mod resources;
mod semantic;
mod session;
#[cfg(test)]
mod tests;

use config::Config;
use resources::{ResourceBundle, ResourceCache};
use session::{FollowUp, QuerySession};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let base_path = config::base_path()?;
    let config = Config::load_with(&base_path)?;

    match args.command {
        cli::Command::Check {} => {
            let missing = config.artifacts.missing(config.base_path());
            if missing.is_empty() {
                println!("all artifacts present in {}", base_path.display());
                return Ok(());
            }
            for (artifact, path) in &missing {
                println!("missing {artifact}: {}", path.display());
            }
            print_fetch_hint();
            bail!("{} artifact(s) missing", missing.len());
        }

        cli::Command::Search { query, top_k } => {
            let top_k = top_k.map(usize::from).unwrap_or(config.top_k);
            let bundle = acquire(&config)?;
            let mut session =
                QuerySession::new(bundle, top_k).with_timeout(config.request_timeout());

            let retrieval = session.classify_and_retrieve(&query.join(" "))?;
            println!("{}", serde_json::to_string_pretty(retrieval)?);
            Ok(())
        }

        cli::Command::Ask { title, question } => {
            let bundle = acquire(&config)?;
            let session =
                QuerySession::new(bundle, config.top_k).with_timeout(config.request_timeout());

            let outcome = session.answer_title(&title, &question.join(" "))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }

        cli::Command::Interactive {} => {
            let bundle = acquire(&config)?;
            let session =
                QuerySession::new(bundle, config.top_k).with_timeout(config.request_timeout());
            run_interactive(session)
        }
    }
}

/// Load the bundle, turning a missing artifact into the fetch hint.
fn acquire(config: &Config) -> anyhow::Result<Arc<ResourceBundle>> {
    let cache = ResourceCache::from_config(config.clone());
    match cache.acquire() {
        Ok(bundle) => Ok(bundle),
        Err(err) if err.is_missing() => {
            print_fetch_hint();
            Err(err.into())
        }
        Err(err) => Err(anyhow::Error::new(err).context("failed to load models and datasets")),
    }
}

fn print_fetch_hint() {
    eprintln!("Required models and datasets were not found locally.");
    eprintln!("Download them into the data directory (see `reelqa check`) and run again.");
}

const NEW_SEARCH: &str = "<new search>";

fn run_interactive(mut session: QuerySession) -> anyhow::Result<()> {
    loop {
        let query = match inquire::Text::new("What kind of movie are you looking for?")
            .with_placeholder("A hacker discovers a simulated reality controlled by machines.")
            .prompt()
        {
            Ok(query) => query,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                return Ok(())
            }
            Err(err) => bail!("An error occurred: {}", err),
        };
        if query.trim().is_empty() {
            continue;
        }

        let titles = match session.classify_and_retrieve(&query) {
            Ok(retrieval) => {
                println!("Predicted genre: {}", retrieval.genre);
                for (idx, m) in retrieval.matches.iter().enumerate() {
                    println!("{}. {} (match score: {:.4})", idx + 1, m.title, m.score);
                }
                retrieval
                    .matches
                    .iter()
                    .map(|m| m.title.clone())
                    .collect::<Vec<_>>()
            }
            Err(err) => {
                eprintln!("search failed: {err}");
                continue;
            }
        };

        if !ask_loop(&mut session, titles)? {
            return Ok(());
        }
    }
}

/// Follow-up questions about the current results. Returns false when the
/// user quits.
fn ask_loop(session: &mut QuerySession, titles: Vec<String>) -> anyhow::Result<bool> {
    let mut options = titles;
    options.push(NEW_SEARCH.to_string());

    loop {
        let selected = match inquire::Select::new("Ask about:", options.clone()).prompt() {
            Ok(selected) if selected == NEW_SEARCH => return Ok(true),
            Ok(selected) => selected,
            Err(InquireError::OperationCanceled) => return Ok(true),
            Err(InquireError::OperationInterrupted) => return Ok(false),
            Err(err) => bail!("An error occurred: {}", err),
        };

        let question = match inquire::Text::new("Your question:")
            .with_placeholder(&format!("Who are the main characters in {selected}?"))
            .prompt()
        {
            Ok(question) => question,
            Err(InquireError::OperationCanceled) => continue,
            Err(InquireError::OperationInterrupted) => return Ok(false),
            Err(err) => bail!("An error occurred: {}", err),
        };

        match session.answer_follow_up(&selected, &question) {
            Ok(FollowUp::Answer { answer, .. }) if answer.is_empty() => {
                println!("No answer found in the plot of '{selected}'.")
            }
            Ok(FollowUp::Answer { answer, .. }) => println!("Answer: {answer}"),
            Ok(FollowUp::NoContext { title }) => {
                println!("Could not find plot context for '{title}' in the dataset.")
            }
            Err(err) => eprintln!("question failed: {err}"),
        }
    }
}
