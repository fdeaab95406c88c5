//! Terminal front end.
//!
//! Lists documents in `DOCUMENTS_DIR`, loads one into a session (reusing its persisted index
//! when the content is unchanged), optionally prints a summary, and answers questions until
//! EOF or `exit`. Logs go to the log file so stdout stays readable.
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use docqa::{
    config, logging,
    processing::{DocumentService, LoadOptions, LoaderKind, PageRange, SummaryChain},
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Parser)]
#[command(
    name = "docqa-cli",
    version,
    about = "Ask questions about local PDF, text, and CSV documents"
)]
struct Cli {
    /// Session whose storage location holds the index.
    #[arg(long, global = true, default_value = "default")]
    session: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List documents available in the documents directory.
    List,
    /// Load a document and start an interactive question loop.
    Chat {
        #[command(flatten)]
        document: DocumentArgs,
        /// Print a summary before the first question.
        #[arg(long)]
        summarize: bool,
        /// Summarization chain: stuff, map_reduce, or refine.
        #[arg(long, default_value = "map_reduce")]
        chain: String,
    },
    /// Load a document and answer a single question.
    Ask {
        #[command(flatten)]
        document: DocumentArgs,
        /// Question to answer.
        #[arg(long, short)]
        question: String,
    },
    /// Load a document and print its summary.
    Summarize {
        #[command(flatten)]
        document: DocumentArgs,
        /// Summarization chain: stuff, map_reduce, or refine.
        #[arg(long, default_value = "map_reduce")]
        chain: String,
    },
}

#[derive(Args)]
struct DocumentArgs {
    /// Document number from `list`, or a file path. Prompted for when omitted.
    document: Option<String>,
    /// First page to load (zero-based, PDF only).
    #[arg(long)]
    start_page: Option<usize>,
    /// Page after the last one to load (PDF only).
    #[arg(long)]
    end_page: Option<usize>,
    /// Loader override: pdf, text, or csv.
    #[arg(long)]
    kind: Option<String>,
    /// Chunk size override in tokens.
    #[arg(long)]
    chunk_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_config();
    logging::init_file_tracing();

    let cli = Cli::parse();
    let service = DocumentService::new(config::get_config());
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    match cli.command {
        Command::List => print_documents(&service).await?,
        Command::Chat {
            document,
            summarize,
            chain,
        } => {
            let chain = parse_chain(&chain)?;
            load(&service, &cli.session, document, &mut input).await?;
            let wants_summary = summarize
                || prompt(&mut input, "Summarize the document first? [y/N]: ")
                    .await?
                    .is_some_and(|answer| answer.eq_ignore_ascii_case("y"));
            if wants_summary {
                let summary = service.summarize(&cli.session, chain).await?;
                println!("\nSummary:\n{summary}\n");
            }
            question_loop(&service, &cli.session, &mut input).await?;
        }
        Command::Ask { document, question } => {
            load(&service, &cli.session, document, &mut input).await?;
            let answer = service.ask_question(&cli.session, &question).await?;
            println!("{}", answer.answer);
        }
        Command::Summarize { document, chain } => {
            let chain = parse_chain(&chain)?;
            load(&service, &cli.session, document, &mut input).await?;
            println!("{}", service.summarize(&cli.session, chain).await?);
        }
    }

    Ok(())
}

async fn print_documents(service: &DocumentService) -> Result<()> {
    let documents = service.list_documents().await?;
    if documents.is_empty() {
        println!("No documents found. Copy files into the documents directory first.");
    }
    for (position, document) in documents.iter().enumerate() {
        println!(
            "{:>3}. {} ({} bytes)",
            position + 1,
            document.name,
            document.size_bytes
        );
    }
    Ok(())
}

async fn load(
    service: &DocumentService,
    session: &str,
    args: DocumentArgs,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    let path = resolve_document(service, args.document, input).await?;
    let kind = args
        .kind
        .as_deref()
        .map(str::parse::<LoaderKind>)
        .transpose()?;
    let is_pdf = kind.or_else(|| LoaderKind::from_path(&path)) == Some(LoaderKind::Pdf);

    let mut page_range = PageRange {
        start: args.start_page,
        end: args.end_page,
    };
    if is_pdf && page_range.is_unbounded() {
        if let Some(raw) = prompt(input, "Page range as start-end (blank for all pages): ").await? {
            page_range = parse_page_range(&raw)?;
        }
    }

    let outcome = service
        .load_document(
            session,
            &path,
            LoadOptions {
                kind,
                page_range: (!page_range.is_unbounded()).then_some(page_range),
                chunk_size: args.chunk_size,
            },
        )
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;

    let status = if outcome.rebuilt {
        "index rebuilt"
    } else {
        "existing index reused"
    };
    println!(
        "Loaded {} ({} chunks, {status}).",
        outcome.source, outcome.chunk_count
    );
    Ok(())
}

async fn resolve_document(
    service: &DocumentService,
    selection: Option<String>,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<PathBuf> {
    let selection = match selection {
        Some(selection) => selection,
        None => {
            print_documents(service).await?;
            prompt(input, "Select a document by number: ")
                .await?
                .context("no document selected")?
        }
    };

    if let Ok(number) = selection.parse::<usize>() {
        let documents = service.list_documents().await?;
        return number
            .checked_sub(1)
            .and_then(|position| documents.into_iter().nth(position))
            .map(|document| document.path)
            .with_context(|| format!("no document numbered {number}"));
    }

    let path = PathBuf::from(&selection);
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    Ok(path)
}

async fn question_loop(
    service: &DocumentService,
    session: &str,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    while let Some(question) = prompt(input, "\nQuestion (or 'exit'): ").await? {
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        match service.ask_question(session, &question).await {
            Ok(answer) => println!("{}", answer.answer),
            Err(error) => println!("Error: {error}"),
        }
    }
    Ok(())
}

/// Print `message` and read one trimmed line. Returns `None` on EOF or a blank line.
async fn prompt(input: &mut Lines<BufReader<Stdin>>, message: &str) -> Result<Option<String>> {
    print!("{message}");
    std::io::stdout().flush()?;
    let line = input.next_line().await?;
    Ok(line
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty()))
}

fn parse_chain(raw: &str) -> Result<SummaryChain> {
    raw.parse::<SummaryChain>().map_err(anyhow::Error::msg)
}

fn parse_page_range(raw: &str) -> Result<PageRange> {
    let (start, end) = raw.split_once('-').unwrap_or((raw, ""));
    let bound = |value: &str| -> Result<Option<usize>> {
        let value = value.trim();
        if value.is_empty() {
            Ok(None)
        } else {
            value
                .parse()
                .map(Some)
                .with_context(|| format!("'{value}' is not a page number"))
        }
    };
    Ok(PageRange {
        start: bound(start)?,
        end: bound(end)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_parses_open_and_closed_bounds() {
        assert_eq!(
            parse_page_range("2-5").unwrap(),
            PageRange {
                start: Some(2),
                end: Some(5)
            }
        );
        assert_eq!(
            parse_page_range("3-").unwrap(),
            PageRange {
                start: Some(3),
                end: None
            }
        );
        assert_eq!(
            parse_page_range("-4").unwrap(),
            PageRange {
                start: None,
                end: Some(4)
            }
        );
        assert!(parse_page_range("two-five").is_err());
    }

    #[test]
    fn cli_parses_ask_arguments() {
        let cli = Cli::try_parse_from([
            "docqa-cli",
            "--session",
            "s1",
            "ask",
            "2",
            "--start-page",
            "1",
            "-q",
            "What is it?",
        ])
        .expect("parse");
        assert_eq!(cli.session, "s1");
        match cli.command {
            Command::Ask { document, question } => {
                assert_eq!(document.document.as_deref(), Some("2"));
                assert_eq!(document.start_page, Some(1));
                assert_eq!(question, "What is it?");
            }
            _ => panic!("expected ask"),
        }
    }
}
