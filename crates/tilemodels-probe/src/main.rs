//! Fetch the placement tiles around a coordinate and print what they place.
//!
//! ```sh
//! tilemodels-probe --lat 48.8584 --lon 2.2945 --config layer.json --radius 1
//! ```

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use glam::DVec2;
use tilemodels::{
    HttpTileSource, LatLon, LayerConfig, MvtDecoder, Placement, TileContent, TileDecoder, TileId,
    TileSource,
    assemble::placement_scale_unit,
    coords::{MAX_ZOOM, lat_lon_to_tile_local, meters_per_extent_unit, tile_local_to_lat_lon},
};

#[derive(Parser, Debug)]
#[command(about = "Inspect the model placements of the tiles around a coordinate")]
struct CliArgs {
    /// Latitude in degrees.
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude in degrees.
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Tile zoom. Defaults to the layer's minimum zoom.
    #[arg(long)]
    zoom: Option<u8>,

    /// Layer configuration as JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tile URL template, overriding the configuration.
    #[arg(long)]
    tile_url: Option<String>,

    /// Model root URL, overriding the configuration.
    #[arg(long)]
    root_url: Option<String>,

    /// Source layer name, overriding the configuration.
    #[arg(long)]
    source_layer: Option<String>,

    /// Also fetch tiles this many steps around the center tile.
    #[arg(long, default_value_t = 0)]
    radius: u32,

    /// Print one JSON object per placement.
    #[arg(long)]
    json: bool,
}

type BoxError = Box<dyn std::error::Error>;

fn load_config(args: &CliArgs) -> Result<LayerConfig, BoxError> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => LayerConfig::default(),
    };
    if let Some(url) = &args.tile_url {
        config.tile_url.clone_from(url);
    }
    if let Some(url) = &args.root_url {
        config.root_url.clone_from(url);
    }
    if let Some(layer) = &args.source_layer {
        config.source_layer.clone_from(layer);
    }
    config.validate()?;
    if config.tile_url.is_empty() {
        return Err("no tile URL: pass --tile-url or set tile_url in the config".into());
    }
    Ok(config)
}

fn tile_zoom(args: &CliArgs, config: &LayerConfig) -> Result<u8, BoxError> {
    let zoom = args.zoom.unwrap_or(config.min_zoom);
    if zoom > MAX_ZOOM {
        return Err(format!("zoom {zoom} is above {MAX_ZOOM}").into());
    }
    Ok(zoom)
}

/// Tiles within `radius` steps of `center`, wrapping in x and clipped in y.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn neighborhood(center: TileId, radius: u32) -> Vec<TileId> {
    let n = i64::from(center.tiles_per_axis());
    let r = i64::from(radius);
    let mut tiles = Vec::new();
    for dy in -r..=r {
        let y = i64::from(center.y) + dy;
        if !(0..n).contains(&y) {
            continue;
        }
        for dx in -r..=r {
            let x = (i64::from(center.x) + dx).rem_euclid(n);
            let tile = TileId::new(center.z, x as u32, y as u32);
            if !tiles.contains(&tile) {
                tiles.push(tile);
            }
        }
    }
    tiles
}

fn report(tile: TileId, placement: &Placement, config: &LayerConfig, json: bool) {
    let position = tile_local_to_lat_lon(tile, DVec2::new(placement.x, placement.y));
    let meters_per_unit = meters_per_extent_unit(position.lat, tile.z);
    let scale_unit = placement_scale_unit(tile, placement);
    let model_url = config.model_url(&placement.model_url);

    if json {
        let value = serde_json::json!({
            "tile": tile.key(),
            "id": placement.id,
            "model": placement.model_name,
            "kind": format!("{:?}", placement.model_kind),
            "lat": position.lat,
            "lon": position.lon,
            "bearing": placement.bearing,
            "scale": placement.scale,
            "meters_per_unit": meters_per_unit,
            "scale_unit": scale_unit,
            "model_url": model_url,
            "texture_url": config.model_url(&placement.texture_url),
        });
        println!("{value}");
    } else {
        println!(
            "{tile} {id:<16} {lat:.6},{lon:.6} bearing {bearing:>6.1} scale {scale:.2} \
             ({meters_per_unit:.4} m/unit) {model_url}",
            id = placement.id,
            lat = position.lat,
            lon = position.lon,
            bearing = placement.bearing,
            scale = placement.scale,
        );
    }
}

async fn run(args: CliArgs) -> Result<usize, BoxError> {
    let config = load_config(&args)?;
    let zoom = tile_zoom(&args, &config)?;
    let (center, local) = lat_lon_to_tile_local(zoom, LatLon::new(args.lat, args.lon));
    tracing::info!(%center, x = local.x, y = local.y, "center tile");

    let source = HttpTileSource::new(config.tile_url.clone());
    let mut total = 0;
    for tile in neighborhood(center, args.radius) {
        let data = match source.fetch_tile(tile).await {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(%tile, %error, "fetch failed");
                continue;
            }
        };
        match MvtDecoder.decode(&data, &config.source_layer) {
            Ok(TileContent::Placements(placements)) => {
                tracing::info!(%tile, placements = placements.len(), "decoded");
                for placement in &placements {
                    report(tile, placement, &config, args.json);
                }
                total += placements.len();
            }
            Ok(TileContent::MissingLayer) => {
                tracing::warn!(%tile, layer = %config.source_layer, "tile has no source layer");
            }
            Err(error) => tracing::warn!(%tile, %error, "decode failed"),
        }
    }
    Ok(total)
}

#[tokio::main]
async fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(CliArgs::parse()).await {
        Ok(total) => {
            tracing::info!(total, "done");
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(%error, "probe failed");
            ExitCode::FAILURE
        }
    }
}
