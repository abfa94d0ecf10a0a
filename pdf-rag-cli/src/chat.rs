//! Interactive question loop.

use pdf_rag::{QueryRequest, RagPipeline};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::print_response;

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub sources: bool,
    pub multi_query: bool,
}

enum Input {
    Quit,
    Handled,
    Question,
}

fn print_help() {
    println!("\n=== PDF RAG interactive mode ===");
    println!("Ask questions about your ingested documents.");
    println!("Type 'exit', 'quit' or 'q' (or press Ctrl+C) to leave.");
    println!("Type 'sources on' / 'sources off' to toggle source listing.");
    println!("Type 'multiquery on' / 'multiquery off' to toggle query expansion.");
    println!("Type 'help' to show this message.");
    println!("================================\n");
}

fn handle_command(line: &str, settings: &mut Settings) -> Input {
    match line.to_lowercase().as_str() {
        "exit" | "quit" | "q" => Input::Quit,
        "help" => {
            print_help();
            Input::Handled
        }
        "sources on" => {
            settings.sources = true;
            println!("Source listing enabled.");
            Input::Handled
        }
        "sources off" => {
            settings.sources = false;
            println!("Source listing disabled.");
            Input::Handled
        }
        "multiquery on" => {
            settings.multi_query = true;
            println!("Multi-query retrieval enabled.");
            Input::Handled
        }
        "multiquery off" => {
            settings.multi_query = false;
            println!("Multi-query retrieval disabled.");
            Input::Handled
        }
        _ => Input::Question,
    }
}

pub async fn run(pipeline: &RagPipeline, mut settings: Settings) -> anyhow::Result<()> {
    print_help();
    let mut editor = DefaultEditor::new()?;

    loop {
        let line = match editor.readline("Question: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        match handle_command(line, &mut settings) {
            Input::Quit => break,
            Input::Handled => continue,
            Input::Question => {
                let request = QueryRequest::new(line)
                    .with_sources(settings.sources)
                    .with_multi_query(settings.multi_query);
                print_response(&pipeline.answer(request).await);
            }
        }
    }

    println!("Exiting interactive mode.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_settings() {
        let mut settings = Settings { sources: false, multi_query: true };
        assert!(matches!(handle_command("Sources On", &mut settings), Input::Handled));
        assert!(matches!(handle_command("multiquery off", &mut settings), Input::Handled));
        assert!(settings.sources);
        assert!(!settings.multi_query);
    }

    #[test]
    fn recognises_quit_and_questions() {
        let mut settings = Settings { sources: false, multi_query: true };
        assert!(matches!(handle_command("Q", &mut settings), Input::Quit));
        assert!(matches!(handle_command("What is in the report?", &mut settings), Input::Question));
    }
}
