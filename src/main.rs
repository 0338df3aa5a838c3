use tracing::Level;

use spectracam::{Capabilities, Configuration, ImageHandle, SpectralProcessor};

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let calibrate = args.iter().any(|a| a == "--calibrate");
    let Some(path) = args.iter().find(|a| !a.starts_with("--")) else {
        eprintln!("usage: spectracam <image-path> [--calibrate]");
        std::process::exit(2);
    };

    let config = Configuration::load()?;
    let processor = SpectralProcessor::new(config, Capabilities::default())?;
    let image = ImageHandle::open(path).await?;

    if calibrate {
        let artifact = processor.calibrate(&image).await?;
        processor.save(&artifact).await?;
        println!("{}", serde_json::to_string_pretty(&artifact)?);
    } else {
        let report = processor.analyze(&image, None).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
