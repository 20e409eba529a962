use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify that every model and dataset file is in place
    Check {},

    /// Find movies matching a plot description
    Search {
        /// Plot or themes you want to watch
        #[clap(required = true, trailing_var_arg = true)]
        query: Vec<String>,

        /// How many movies to return (config top_k by default)
        #[clap(short = 'k', long, value_parser = clap::value_parser!(u16).range(1..))]
        top_k: Option<u16>,
    },

    /// Ask a question about a movie's plot
    Ask {
        /// Exact movie title as listed in the catalog
        #[clap(short, long)]
        title: String,

        /// The question
        #[clap(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },

    /// Search and ask follow-up questions in a prompt loop
    Interactive {},
}
