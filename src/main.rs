// src/main.rs
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use receiptsnap::ai::connector::AiConnector;
use receiptsnap::ai::gemini::GeminiClient;
use receiptsnap::app::tasks::{self, SharedController};
use receiptsnap::app::{Controller, SubmissionStatus, ViewState};
#[cfg(feature = "desktop")]
use receiptsnap::capture::camera::CameraDevice;
use receiptsnap::capture::image::CapturedImage;
#[cfg(feature = "desktop")]
use receiptsnap::capture::permission::CameraAuthority;
use receiptsnap::config::{self, Settings};

#[derive(Parser)]
#[command(name = "receiptsnap")]
#[command(about = "Ask Gemini questions about receipts and invoices", long_about = None)]
struct Cli {
    /// Configuration file holding API_KEY (default: GenerativeAI-Info.toml)
    #[arg(long, global = true, env = config::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Gemini model name, overrides MODEL from the config file
    #[arg(long, short = 'm', global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question about an image file
    Ask {
        /// Receipt or invoice image (PNG, JPEG, ...)
        #[arg(long, short = 'i')]
        image: PathBuf,

        /// Question to ask about the image
        #[arg(long, short = 'q')]
        question: String,

        /// Print the final view state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Capture the screen and ask a question about it
    #[cfg(feature = "desktop")]
    Capture {
        /// Question to ask about the capture
        #[arg(long, short = 'q')]
        question: String,

        /// Save the capture to file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Validate the configuration file and exit
    CheckConfig,
    /// Run simple interactive mode
    Interactive,
    /// Run graphical user interface
    #[cfg(feature = "desktop")]
    Gui,
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info")
    );

    let cli = Cli::parse();
    let settings = load_settings(cli.config, cli.model)?;

    match cli.command {
        Commands::Ask { image, question, json } => run_ask(settings, image, question, json),
        #[cfg(feature = "desktop")]
        Commands::Capture { question, save } => run_capture(settings, question, save),
        Commands::CheckConfig => {
            println!("Configuration OK (model: {}, endpoint: {})", settings.model, settings.base_url);
            Ok(())
        }
        Commands::Interactive => run_interactive_mode(settings),
        #[cfg(feature = "desktop")]
        Commands::Gui => receiptsnap::gui::run_gui(settings),
    }
}

/// A misconfigured build must not reach any UI.
fn load_settings(config_arg: Option<PathBuf>, model: Option<String>) -> Result<Settings> {
    let path = config::resolve_path(config_arg);
    match Settings::load(&path) {
        Ok(settings) => Ok(settings.with_model(model)),
        Err(e) => {
            error!("Fatal configuration error: {}", e);
            Err(e.into())
        }
    }
}

fn connector(settings: &Settings) -> Result<Arc<dyn AiConnector>> {
    Ok(Arc::new(GeminiClient::new(settings)?))
}

fn run_ask(settings: Settings, image: PathBuf, question: String, json: bool) -> Result<()> {
    let controller = tasks::shared(Controller::default());

    info!("Loading image: {}", image.display());
    tasks::spawn_acquisition(&controller, move || CapturedImage::from_path(&image).map(Some), || {})
        .join()
        .map_err(|_| anyhow!("Image loading thread panicked"))?;

    tasks::lock(&controller).set_question(question);
    ask_and_wait(&controller, connector(&settings)?)?;

    let state = tasks::lock(&controller).snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return generation_result(&state);
    }
    print_answer(&controller, &settings.model)
}

/// A failed request is an error exit whatever the output format.
fn generation_result(state: &ViewState) -> Result<()> {
    match state.status {
        SubmissionStatus::Failed => Err(anyhow!(
            "Gemini request failed: {}",
            state.generation_error.as_deref().unwrap_or_default()
        )),
        _ => Ok(()),
    }
}

fn ask_and_wait(controller: &SharedController, connector: Arc<dyn AiConnector>) -> Result<()> {
    {
        let guard = tasks::lock(controller);
        if guard.image().is_none() {
            return Err(anyhow!("No image available, check the log for details"));
        }
        if !guard.can_submit() {
            return Err(anyhow!("Please enter a question first"));
        }
    }

    info!("Sending image to Gemini for analysis...");
    if let Some(handle) = tasks::spawn_submission(controller, connector, || {}) {
        handle.join().map_err(|_| anyhow!("Generation thread panicked"))?;
    }
    Ok(())
}

fn print_answer(controller: &SharedController, model_name: &str) -> Result<()> {
    let state = tasks::lock(controller).snapshot();
    generation_result(&state)?;
    println!("\n=== Answer (Gemini: {}) ===", model_name);
    println!("{}", state.answer);
    println!("===========================================\n");
    Ok(())
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

#[cfg(feature = "desktop")]
fn ask_yes_no(prompt: &str) -> bool {
    match prompt_line(&format!("{} [y/N]: ", prompt)) {
        Ok(answer) => matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            error!("Failed to read answer: {}", e);
            false
        }
    }
}

/// Terminal-driven permission and shutter. Built once per session so the
/// user's permission answer sticks.
#[cfg(feature = "desktop")]
struct TerminalCamera {
    authority: Arc<dyn CameraAuthority>,
    device: Arc<dyn CameraDevice>,
}

#[cfg(feature = "desktop")]
impl TerminalCamera {
    fn new(settings: &Settings) -> Self {
        use receiptsnap::capture::camera::ScreenCamera;
        use receiptsnap::capture::permission::ConsentAuthority;

        let authority = ConsentAuthority::new(settings.camera_access, || {
            ask_yes_no("Allow receiptsnap to capture your screen?")
        });
        let device = ScreenCamera::new(|| ask_yes_no("Capture the screen now?"));
        Self {
            authority: Arc::new(authority),
            device: Arc::new(device),
        }
    }
}

#[cfg(feature = "desktop")]
fn capture_into(controller: &SharedController, camera: &TerminalCamera) -> Result<()> {
    let authority = Arc::clone(&camera.authority);
    let device = Arc::clone(&camera.device);
    tasks::spawn_camera_capture(controller, authority, device, || {})
        .join()
        .map_err(|_| anyhow!("Capture thread panicked"))?;

    let mut guard = tasks::lock(controller);
    if let Some(message) = guard.state().permission_error.clone() {
        println!("✗ {}", message);
        guard.dismiss_permission_error();
    }
    Ok(())
}

#[cfg(feature = "desktop")]
fn run_capture(settings: Settings, question: String, save: Option<PathBuf>) -> Result<()> {
    info!("Starting capture mode");
    let controller = tasks::shared(Controller::default());
    capture_into(&controller, &TerminalCamera::new(&settings))?;

    if let Some(save_path) = &save {
        if let Some(image) = tasks::lock(&controller).image() {
            image.save_png(save_path)?;
        }
    }

    tasks::lock(&controller).set_question(question);
    ask_and_wait(&controller, connector(&settings)?)?;
    print_answer(&controller, &settings.model)
}

fn run_interactive_mode(settings: Settings) -> Result<()> {
    println!("🧾  receiptsnap Interactive Mode");
    println!("===============================");

    let controller = tasks::shared(Controller::default());
    let connector = connector(&settings)?;
    #[cfg(feature = "desktop")]
    let camera = TerminalCamera::new(&settings);

    loop {
        let (has_image, question, can_submit) = {
            let guard = tasks::lock(&controller);
            (guard.image().is_some(), guard.state().question.clone(), guard.can_submit())
        };

        println!("\nMain Menu:");
        println!("1. Choose image file {}", if has_image { "(image loaded)" } else { "" });
        println!("2. Capture screen");
        println!("3. Enter question {}", if question.is_empty() { String::new() } else { format!("(\"{}\")", question) });
        println!("4. Ask{}", if can_submit { "" } else { " (needs an image and a question)" });
        println!("5. Show state as JSON");
        println!("6. Reset");
        println!("7. Exit");

        match prompt_line("\nEnter your choice (1-7): ")?.as_str() {
            "1" => {
                let path = prompt_line("Image path: ")?;
                if path.is_empty() {
                    continue;
                }
                let path = PathBuf::from(path);
                tasks::spawn_acquisition(&controller, move || CapturedImage::from_path(&path).map(Some), || {})
                    .join()
                    .map_err(|_| anyhow!("Image loading thread panicked"))?;
                match tasks::lock(&controller).state().image {
                    Some(summary) => println!("✓ Image ready: {}x{}", summary.width, summary.height),
                    None => println!("✗ No image loaded"),
                }
            }
            "2" => {
                #[cfg(feature = "desktop")]
                capture_into(&controller, &camera)?;
                #[cfg(not(feature = "desktop"))]
                println!("Screen capture needs the 'desktop' feature");
            }
            "3" => {
                let question = prompt_line("Question: ")?;
                tasks::lock(&controller).set_question(question);
            }
            "4" => {
                if !can_submit {
                    println!("Please choose an image and enter a question first.");
                    continue;
                }
                ask_and_wait(&controller, Arc::clone(&connector))?;
                if let Err(e) = print_answer(&controller, &settings.model) {
                    println!("✗ {}", e);
                }
            }
            "5" => {
                let state = tasks::lock(&controller).snapshot();
                println!("{}", serde_json::to_string_pretty(&state)?);
            }
            "6" => {
                tasks::lock(&controller).reset();
                println!("✓ Cleared");
            }
            "7" => {
                println!("Exiting receiptsnap");
                break;
            }
            _ => println!("Invalid choice. Please enter a number between 1 and 7."),
        }
    }

    Ok(())
}
