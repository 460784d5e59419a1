use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dialoguer::{Confirm, Editor, Input, Select};

use crate::concepts::{ACCEPTED_EXTENSIONS, join_concepts, read_text_file, split_concepts};
use crate::config::Config;
use crate::extract::ConceptExtractor;
use crate::session::Session;
use crate::surface::{Event, InputMode, MISSING_INPUT_MESSAGE, SurfaceState};

pub struct RunContext<'a> {
    pub config: &'a Config,
    pub extractor: Arc<dyn ConceptExtractor>,
}

#[derive(Debug, Default, Clone)]
pub struct OutputOptions {
    pub path: Option<PathBuf>,
    pub json: bool,
}

/// Collects source text from a file, positional arguments, or stdin, in that order of preference.
pub fn read_source_text(input: Option<&Path>, args: &[String]) -> Result<String> {
    let mut text = String::new();

    if let Some(path) = input {
        text = read_text_file(path)
            .with_context(|| format!("failed to read source text from {path:?}"))?;
    }

    if !args.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&args.join(" "));
    }

    if input.is_none() && args.is_empty() {
        tracing::debug!("Reading source text from stdin");
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read source text from stdin")?;
    }

    Ok(text)
}

pub fn run_split_flow(text: &str, output: &OutputOptions) -> Result<()> {
    let concepts = split_concepts(text);
    tracing::info!("{} concepts in list", concepts.len());
    write_concepts(&concepts, output)
}

pub async fn run_extract_flow(
    text: &str,
    output: &OutputOptions,
    ctx: &RunContext<'_>,
) -> Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("{MISSING_INPUT_MESSAGE}");
    }

    tracing::info!("Analysing text with {}...", ctx.config.model);
    let concepts = match ctx.extractor.extract_concepts(text).await {
        Ok(concepts) => concepts,
        Err(err) if err.is_configuration() => {
            return Err(anyhow::Error::new(err).context("AI extraction is not configured"));
        }
        Err(err) => return Err(anyhow::Error::new(err).context("AI extraction failed")),
    };

    tracing::info!("Success! {} concepts found.", concepts.len());
    write_concepts(&concepts, output)
}

#[derive(Debug, Clone, Copy)]
enum Action {
    EditText,
    LoadFile,
    SwitchMode(InputMode),
    Extract,
    ShowConcepts,
    Clear,
    Finish,
}

pub async fn run_interactive_session(
    default_mode: Option<InputMode>,
    output: &OutputOptions,
    ctx: &RunContext<'_>,
) -> Result<()> {
    let state =
        SurfaceState::new(ctx.config.success_delay).with_mode(default_mode.unwrap_or_default());
    let mut session = Session::new(state, Arc::clone(&ctx.extractor), |concepts: &[String]| {
        tracing::debug!("Concept list updated: {} concepts", concepts.len());
    });

    loop {
        session.drain_pending();
        print_status(session.state());

        match prompt_action(session.state())? {
            Action::EditText => {
                let edited = Editor::new()
                    .extension(".txt")
                    .edit(&session.state().text)
                    .context("failed to open text editor")?;
                match edited {
                    Some(text) => session.dispatch(Event::TextEdited(text)),
                    None => tracing::info!("Editor closed without saving; text unchanged."),
                }
            }
            Action::LoadFile => {
                let raw_path = Input::<String>::new()
                    .with_prompt(format!(
                        "Path to a text file ({})",
                        ACCEPTED_EXTENSIONS
                            .iter()
                            .map(|ext| format!(".{ext}"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                    .interact_text()?;
                match read_text_file(Path::new(raw_path.trim())) {
                    Ok(text) => session.dispatch(Event::FileLoaded(text)),
                    Err(err) => tracing::warn!("{:#}", err),
                }
            }
            Action::SwitchMode(mode) => session.dispatch(Event::ModeSelected(mode)),
            Action::Extract => {
                session.dispatch(Event::ExtractRequested);
                if session.state().is_processing() {
                    println!("Analysing...");
                    session.wait_for_extraction().await;
                }
            }
            Action::ShowConcepts => print_concepts(&session.state().concepts),
            Action::Clear => {
                let confirmed = Confirm::new()
                    .with_prompt("Discard the current text and concept list?")
                    .default(false)
                    .interact()
                    .context("failed to read confirmation input")?;
                if confirmed {
                    session.dispatch(Event::Cleared);
                }
            }
            Action::Finish => break,
        }
    }

    let state = session.into_state();
    if state.concepts.is_empty() {
        tracing::warn!("Finished without any concepts.");
    }
    write_concepts(&state.concepts, output)
}

fn prompt_action(state: &SurfaceState) -> Result<Action> {
    let mut items: Vec<(&str, Action)> = Vec::new();

    match state.mode {
        InputMode::Manual => {
            items.push(("Edit concept list (one per line)", Action::EditText));
            items.push(("Load list from file", Action::LoadFile));
            items.push((
                "Switch to AI extraction",
                Action::SwitchMode(InputMode::AiExtract),
            ));
        }
        InputMode::AiExtract => {
            items.push(("Edit raw text for analysis", Action::EditText));
            items.push(("Load text from file", Action::LoadFile));
            if state.trigger_enabled() {
                items.push(("Extract concepts with AI", Action::Extract));
            }
            items.push((
                "Switch to manual list",
                Action::SwitchMode(InputMode::Manual),
            ));
        }
    }

    items.push(("Show concepts", Action::ShowConcepts));
    items.push(("Clear", Action::Clear));
    items.push(("Done", Action::Finish));

    let labels: Vec<&str> = items.iter().map(|(label, _)| *label).collect();
    let choice = Select::new()
        .with_prompt(format!("Concept input ({})", state.mode))
        .items(&labels)
        .default(0)
        .interact()
        .context("failed to read menu selection")?;

    Ok(items[choice].1)
}

fn print_status(state: &SurfaceState) {
    println!(
        "[{}] {} concepts, {} characters of text",
        state.mode,
        state.concepts.len(),
        state.text.chars().count()
    );
    if let Some(message) = state.success_message() {
        println!("  OK: {message}");
    } else if let Some(message) = state.error() {
        println!("  {message}");
    } else if state.is_processing() {
        println!("  Analysing...");
    }
}

fn print_concepts(concepts: &[String]) {
    if concepts.is_empty() {
        println!("  (no concepts yet)");
        return;
    }
    for (idx, concept) in concepts.iter().enumerate() {
        println!("  {:>3}. {}", idx + 1, concept);
    }
}

fn render_concepts(concepts: &[String], json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(concepts).context("failed to serialize concepts to JSON")
    } else {
        Ok(join_concepts(concepts))
    }
}

fn write_concepts(concepts: &[String], output: &OutputOptions) -> Result<()> {
    let rendered = render_concepts(concepts, output.json)?;

    match &output.path {
        Some(path) => {
            fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("failed to write concepts to {}", path.display()))?;
            tracing::info!("Wrote {} concepts to {}", concepts.len(), path.display());
        }
        None => {
            if !rendered.is_empty() {
                println!("{rendered}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ConfigOverrides;
    use crate::extract::ExtractError;

    struct FixedExtractor(Vec<&'static str>);

    #[async_trait]
    impl ConceptExtractor for FixedExtractor {
        async fn extract_concepts(&self, _text: &str) -> Result<Vec<String>, ExtractError> {
            Ok(self.0.iter().map(|c| c.to_string()).collect())
        }
    }

    #[test]
    fn file_text_and_arguments_are_combined() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Eerste alinea").unwrap();

        let text =
            read_source_text(Some(file.path()), &["en".into(), "meer".into()]).unwrap();
        assert_eq!(text, "Eerste alinea\nen meer");
    }

    #[test]
    fn arguments_alone_skip_stdin() {
        let text = read_source_text(None, &["Appel".into(), "Peer".into()]).unwrap();
        assert_eq!(text, "Appel Peer");
    }

    #[test]
    fn renders_json_array() {
        let concepts = vec!["Appel".to_string(), "Peer".to_string()];
        let json = render_concepts(&concepts, true).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, concepts);
        assert_eq!(render_concepts(&concepts, false).unwrap(), "Appel\nPeer");
    }

    #[test]
    fn split_flow_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concepts.txt");
        let output = OutputOptions {
            path: Some(path.clone()),
            json: false,
        };

        run_split_flow(" Kaas\n\n Molen \n", &output).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "Kaas\nMolen\n");
    }

    #[tokio::test]
    async fn extract_flow_rejects_blank_text() {
        let config = Config::load_for_tests(ConfigOverrides::default());
        let ctx = RunContext {
            config: &config,
            extractor: Arc::new(FixedExtractor(vec!["Appel"])),
        };

        let err = run_extract_flow("  ", &OutputOptions::default(), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), MISSING_INPUT_MESSAGE);
    }

    #[tokio::test]
    async fn extract_flow_writes_json() {
        let config = Config::load_for_tests(ConfigOverrides::default());
        let ctx = RunContext {
            config: &config,
            extractor: Arc::new(FixedExtractor(vec!["Appel", "Peer"])),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concepts.json");
        let output = OutputOptions {
            path: Some(path.clone()),
            json: true,
        };

        run_extract_flow("Fruit op de markt", &output, &ctx)
            .await
            .unwrap();
        let parsed: Vec<String> =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed, vec!["Appel", "Peer"]);
    }
}
