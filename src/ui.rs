// UI module for the emotion view window

use crate::models::Frame;
use crate::overlay::Overlay;
use crate::state::{ToggleAction, ViewSnapshot};
use crate::view::EmotionDetectionView;
use std::sync::Arc;
use std::time::Duration;

const BOX_COLOR: egui::Color32 = egui::Color32::from_rgb(0, 140, 255);
const LABEL_COLOR: egui::Color32 = egui::Color32::WHITE;

/// Main application UI
pub struct EmotionViewApp {
    view: EmotionDetectionView,
    repaint_interval: Duration,
    camera_texture: Option<egui::TextureHandle>,
    shown_frame: Option<Arc<Frame>>,
}

impl EmotionViewApp {
    /// Creates a new EmotionViewApp
    pub fn new(view: EmotionDetectionView, repaint_interval: Duration) -> Self {
        Self {
            view,
            repaint_interval,
            camera_texture: None,
            shown_frame: None,
        }
    }

    /// Uploads the latest frame when it changed since the last repaint
    fn update_camera_texture(&mut self, ctx: &egui::Context) {
        let Some(frame) = self.view.latest_frame() else {
            self.camera_texture = None;
            self.shown_frame = None;
            return;
        };
        if self
            .shown_frame
            .as_ref()
            .is_some_and(|shown| Arc::ptr_eq(shown, &frame))
        {
            return;
        }

        let color_image = egui::ColorImage::from_rgb(
            [frame.width as usize, frame.height as usize],
            &frame.data,
        );
        match &mut self.camera_texture {
            Some(texture) => texture.set(color_image, egui::TextureOptions::LINEAR),
            None => {
                self.camera_texture =
                    Some(ctx.load_texture("camera", color_image, egui::TextureOptions::LINEAR));
            }
        }
        self.shown_frame = Some(frame);
    }

    fn render_controls(&self, ui: &mut egui::Ui, snapshot: &ViewSnapshot) {
        let status = snapshot.status_line();
        if snapshot.models_loaded() {
            ui.colored_label(egui::Color32::from_rgb(40, 160, 70), status);
        } else {
            ui.label(status);
        }

        let button = snapshot.toggle_button();
        let clicked = ui
            .add_enabled(button.enabled, egui::Button::new(button.label))
            .clicked();
        if clicked {
            match button.action {
                ToggleAction::Start => {
                    // the request finishes on the runtime
                    let _ = self.view.start();
                }
                ToggleAction::Stop => self.view.stop(),
            }
        }
    }

    /// Renders the video with the overlay painted on top at the same size
    fn render_video(&self, ui: &mut egui::Ui, overlay: &Overlay) {
        let size = overlay.size();
        let pane = egui::vec2(size.width as f32, size.height as f32);
        let (rect, _) = ui.allocate_exact_size(pane, egui::Sense::hover());

        if let Some(texture) = &self.camera_texture {
            ui.painter().image(
                texture.id(),
                rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }
        paint_overlay(ui.painter(), rect.min, overlay);
    }

    fn render_emotion_card(&self, ui: &mut egui::Ui, snapshot: &ViewSnapshot) {
        let Some(card) = snapshot.emotion_card() else {
            return;
        };
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label("Detected Emotion:");
                ui.strong(&card.label);
            });
            ui.add(
                egui::ProgressBar::new(card.fill())
                    .desired_width(300.0)
                    .text(card.percentage_text()),
            );
        });
    }
}

/// Draws boxes and expression labels relative to `origin`
fn paint_overlay(painter: &egui::Painter, origin: egui::Pos2, overlay: &Overlay) {
    let stroke = egui::Stroke::new(2.0, BOX_COLOR);
    for face in overlay.boxes() {
        let min = origin + egui::vec2(face.bbox.x, face.bbox.y);
        let rect = egui::Rect::from_min_size(min, egui::vec2(face.bbox.width, face.bbox.height));
        painter.rect_stroke(rect, 0.0, stroke, egui::StrokeKind::Outside);
        if let Some(caption) = &face.caption {
            painter.text(
                min,
                egui::Align2::LEFT_BOTTOM,
                caption,
                egui::FontId::proportional(14.0),
                BOX_COLOR,
            );
        }
    }

    let background_color = egui::Color32::from_black_alpha(160);
    for label in overlay.labels() {
        let mut anchor = origin + egui::vec2(label.x, label.y);
        for line in &label.lines {
            let galley = painter.layout_no_wrap(
                line.clone(),
                egui::FontId::proportional(14.0),
                LABEL_COLOR,
            );
            let background = egui::Rect::from_min_size(anchor, galley.size());
            painter.rect_filled(background, 0.0, background_color);
            let height = galley.size().y;
            painter.galley(anchor, galley, LABEL_COLOR);
            anchor.y += height;
        }
    }
}

impl eframe::App for EmotionViewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(self.repaint_interval);

        let snapshot = self.view.snapshot();
        self.update_camera_texture(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                self.render_controls(ui, &snapshot);
                ui.add_space(12.0);
                if snapshot.shows_video() {
                    self.render_video(ui, &snapshot.overlay);
                    ui.add_space(12.0);
                }
                self.render_emotion_card(ui, &snapshot);
            });
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.view.stop();
    }
}
