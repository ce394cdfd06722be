// src/gui.rs
use anyhow::Result;
use eframe::egui;
use egui::{Color32, RichText, ScrollArea, Vec2};
use log::{error, info};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

#[cfg(feature = "clipboard")]
use arboard::Clipboard;

use crate::ai::connector::AiConnector;
use crate::ai::gemini::GeminiClient;
use crate::app::tasks::{self, SharedController};
use crate::app::{Controller, SubmissionStatus, ViewState};
use crate::capture::camera::{CameraDevice, ScreenCamera};
use crate::capture::image::CapturedImage;
use crate::capture::permission::{CameraAuthority, ConsentAuthority};
use crate::config::Settings;

const WINDOW_WIDTH: f32 = 520.0;
const DEFAULT_WINDOW_HEIGHT: f32 = 720.0;
const PREVIEW_MAX_HEIGHT: f32 = 360.0;

/// A yes/no question raised by a worker thread, answered in the UI.
struct PendingDialog {
    message: String,
    reply: Sender<bool>,
}

/// Lets worker threads block on a yes/no answer rendered by egui.
#[derive(Clone)]
struct DialogBridge {
    requests: Arc<Mutex<Sender<PendingDialog>>>,
    ctx: egui::Context,
}

impl DialogBridge {
    fn ask(&self, message: &str) -> bool {
        let (reply, answer) = mpsc::channel();
        let sent = self
            .requests
            .lock()
            .map(|requests| {
                requests
                    .send(PendingDialog { message: message.to_string(), reply })
                    .is_ok()
            })
            .unwrap_or(false);
        if !sent {
            return false;
        }
        self.ctx.request_repaint();
        // A closed window drops the sender, which counts as "no".
        answer.recv().unwrap_or(false)
    }
}

pub struct ReceiptSnapApp {
    controller: SharedController,
    connector: Arc<dyn AiConnector>,
    authority: Arc<dyn CameraAuthority>,
    camera: Arc<dyn CameraDevice>,
    dialogs: Receiver<PendingDialog>,
    active_dialog: Option<PendingDialog>,
    question_input: String,
    texture: Option<egui::TextureHandle>,
    texture_revision: u64,
    model_name: String,
    was_style_initialized: bool,
}

impl ReceiptSnapApp {
    fn new(settings: &Settings, connector: Arc<dyn AiConnector>, ctx: egui::Context) -> Self {
        let (requests, dialogs) = mpsc::channel();
        let bridge = DialogBridge {
            requests: Arc::new(Mutex::new(requests)),
            ctx,
        };

        let permission_bridge = bridge.clone();
        let authority = ConsentAuthority::new(settings.camera_access, move || {
            permission_bridge.ask("Allow receiptsnap to capture your screen?")
        });
        let camera = ScreenCamera::new(move || bridge.ask("Capture the screen now?"));

        Self {
            controller: tasks::shared(Controller::default()),
            connector,
            authority: Arc::new(authority),
            camera: Arc::new(camera),
            dialogs,
            active_dialog: None,
            question_input: String::new(),
            texture: None,
            texture_revision: 0,
            model_name: settings.model.clone(),
            was_style_initialized: false,
        }
    }

    fn repaint_hook(ctx: &egui::Context) -> impl Fn() + Send + 'static {
        let ctx = ctx.clone();
        move || ctx.request_repaint()
    }

    fn refresh_texture(&mut self, ctx: &egui::Context) {
        let image_to_load = {
            let guard = tasks::lock(&self.controller);
            if guard.image_revision() == self.texture_revision {
                return;
            }
            self.texture_revision = guard.image_revision();
            guard.image().map(|image| image.image().to_rgba8())
        };

        self.texture = image_to_load.map(|rgba| {
            let size = [rgba.width() as usize, rgba.height() as usize];
            let egui_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_flat_samples().as_slice());
            ctx.load_texture("receipt_texture", egui_image, egui::TextureOptions::LINEAR)
        });
    }

    fn pick_from_library(&mut self, ctx: &egui::Context) {
        let picked = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "gif", "bmp"])
            .pick_file();

        match picked {
            Some(path) => {
                info!("Picked image: {}", path.display());
                tasks::spawn_acquisition(
                    &self.controller,
                    move || CapturedImage::from_path(&path).map(Some),
                    Self::repaint_hook(ctx),
                );
            }
            None => tasks::lock(&self.controller).close_library_picker(),
        }
    }

    fn capture_screen(&mut self, ctx: &egui::Context) {
        tasks::spawn_camera_capture(
            &self.controller,
            Arc::clone(&self.authority),
            Arc::clone(&self.camera),
            Self::repaint_hook(ctx),
        );
    }

    fn submit(&mut self, ctx: &egui::Context) {
        if tasks::spawn_submission(&self.controller, Arc::clone(&self.connector), Self::repaint_hook(ctx)).is_none() {
            info!("Submit ignored: question or image missing");
        }
    }

    fn copy_answer_to_clipboard(&self, answer: &str) {
        #[cfg(feature = "clipboard")]
        {
            match Clipboard::new() {
                Ok(mut clipboard) => match clipboard.set_text(answer.to_string()) {
                    Ok(()) => info!("Answer copied to clipboard"),
                    Err(e) => error!("Failed to copy answer to clipboard: {}", e),
                },
                Err(e) => error!("Failed to access clipboard: {}", e),
            }
        }
        #[cfg(not(feature = "clipboard"))]
        {
            let _ = answer;
            error!("Clipboard feature not enabled. Enable the 'clipboard' feature in Cargo.toml");
        }
    }

    fn show_dialogs(&mut self, ctx: &egui::Context) {
        if self.active_dialog.is_none() {
            self.active_dialog = self.dialogs.try_recv().ok();
        }
        let Some(dialog) = &self.active_dialog else {
            return;
        };

        let mut answer = None;
        egui::Window::new("receiptsnap")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(&dialog.message);
                ui.horizontal(|ui| {
                    if ui.button("Yes").clicked() {
                        answer = Some(true);
                    }
                    if ui.button("No").clicked() {
                        answer = Some(false);
                    }
                });
            });

        if let Some(answer) = answer {
            if let Some(dialog) = self.active_dialog.take() {
                let _ = dialog.reply.send(answer);
            }
        }
    }

    fn show_image_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, state: &ViewState) {
        ui.horizontal(|ui| {
            let busy = state.acquiring || self.active_dialog.is_some();
            if ui.add_enabled(!busy, egui::Button::new("📁 Choose Image")).clicked() {
                tasks::lock(&self.controller).open_library_picker();
            }
            if ui.add_enabled(!busy, egui::Button::new("📷 Capture Screen")).clicked() {
                self.capture_screen(ctx);
            }
            if state.acquiring {
                ui.spinner();
            }
        });

        if let Some(message) = &state.permission_error {
            ui.horizontal(|ui| {
                ui.colored_label(Color32::from_rgb(230, 90, 90), message);
                if ui.small_button("Dismiss").clicked() {
                    tasks::lock(&self.controller).dismiss_permission_error();
                }
            });
        }

        match &self.texture {
            Some(texture) => {
                let size = texture.size_vec2();
                let available_width = ui.available_width();
                let scale = (available_width / size.x).min(PREVIEW_MAX_HEIGHT / size.y).min(1.0);
                ui.image((texture.id(), size * scale));
            }
            None => {
                ui.label(RichText::new("No receipt selected").italics());
            }
        }
    }

    fn show_question_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, state: &ViewState) {
        let response = ui.add(
            egui::TextEdit::singleline(&mut self.question_input)
                .hint_text("Ask something about the receipt, e.g. What is the total?")
                .desired_width(f32::INFINITY),
        );
        if response.changed() {
            tasks::lock(&self.controller).set_question(self.question_input.clone());
        }

        let can_submit = tasks::lock(&self.controller).can_submit();
        let enter_pressed = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        ui.horizontal(|ui| {
            let clicked = ui.add_enabled(can_submit, egui::Button::new("Ask Gemini")).clicked();
            if clicked || (enter_pressed && can_submit) {
                self.submit(ctx);
            }
            if state.status == SubmissionStatus::Pending {
                ui.spinner();
                ui.label(format!("Waiting for {}...", self.model_name));
            }
        });
    }

    fn show_answer_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, state: &ViewState) {
        if let Some(message) = &state.generation_error {
            ui.horizontal(|ui| {
                ui.colored_label(Color32::from_rgb(230, 90, 90), format!("Request failed: {}", message));
                if ui.small_button("Retry").clicked() {
                    self.submit(ctx);
                }
            });
        }

        if state.answer.is_empty() {
            return;
        }

        ui.separator();
        ui.horizontal(|ui| {
            ui.heading("Answer");
            if ui.small_button("📋 Copy").clicked() {
                self.copy_answer_to_clipboard(&state.answer);
            }
        });
        ScrollArea::vertical().id_source("answer_scroll").show(ui, |ui| {
            ui.label(&state.answer);
        });
    }
}

impl eframe::App for ReceiptSnapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.was_style_initialized {
            let mut style = (*ctx.style()).clone();
            style.visuals.selection.bg_fill = Color32::from_rgb(42, 90, 170);
            style.text_styles.insert(
                egui::TextStyle::Body,
                egui::FontId::new(15.0, egui::FontFamily::Proportional),
            );
            style.text_styles.insert(
                egui::TextStyle::Button,
                egui::FontId::new(15.0, egui::FontFamily::Proportional),
            );
            ctx.set_style(style);
            self.was_style_initialized = true;
        }

        let state = tasks::lock(&self.controller).snapshot();
        if state.show_library_picker && !state.acquiring {
            self.pick_from_library(ctx);
        }

        self.refresh_texture(ctx);
        self.show_dialogs(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Receipt Analyzer");
            ui.add_space(8.0);
            ScrollArea::vertical().show(ui, |ui| {
                self.show_image_section(ui, ctx, &state);
                ui.add_space(8.0);
                self.show_question_section(ui, ctx, &state);
                ui.add_space(8.0);
                self.show_answer_section(ui, ctx, &state);
            });
        });
    }
}

pub fn run_gui(settings: Settings) -> Result<()> {
    info!("receiptsnap GUI starting up...");

    let connector: Arc<dyn AiConnector> = Arc::new(GeminiClient::new(&settings)?);

    let native_options = eframe::NativeOptions {
        initial_window_size: Some(egui::vec2(WINDOW_WIDTH, DEFAULT_WINDOW_HEIGHT)),
        ..eframe::NativeOptions::default()
    };

    eframe::run_native(
        "receiptsnap",
        native_options,
        Box::new(move |cc| {
            Box::new(ReceiptSnapApp::new(&settings, connector, cc.egui_ctx.clone()))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to start GUI: {}", e))?;

    Ok(())
}
