use clap::Parser;
use emotion_view::camera::{self, NokhwaDevices};
use emotion_view::config::{AppConfig, Args};
use emotion_view::error::{EmotionViewError, Result};
use emotion_view::loader::{self, ModelGate};
use emotion_view::ui::EmotionViewApp;
use emotion_view::view::EmotionDetectionView;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system (file only, no console output)
fn init_logging(log_file: &Path) -> Result<()> {
    let log_file = std::fs::File::create(log_file).map_err(EmotionViewError::Io)?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_cameras {
        for device in camera::list_devices()? {
            println!("{device}");
        }
        return Ok(());
    }

    let config = AppConfig::from_args(&args)?;
    init_logging(&config.log_file)?;
    info!("Starting with {:?}", config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let models = ModelGate::spawn(
        runtime.handle(),
        loader::load_face_analyzer(config.clone()),
    );
    let view = EmotionDetectionView::new(
        config.clone(),
        runtime.handle().clone(),
        Arc::new(NokhwaDevices),
        models,
    );

    let result = eframe::run_native(
        "Emotion View",
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([
                    config.display_width as f32 + 80.0,
                    config.display_height as f32 + 260.0,
                ])
                .with_title("Emotion View"),
            ..Default::default()
        },
        Box::new(move |_cc| {
            Ok(Box::new(EmotionViewApp::new(
                view,
                Duration::from_millis(33),
            )))
        }),
    );

    if let Err(e) = result {
        error!("Application error: {}", e);
    }

    Ok(())
}
