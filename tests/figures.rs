//! End-to-end figure building through the public API, from a config file on disk.

use propdash::charts::{
    write_figure, ChartKind, FigureBuilder, FigureError, FigureRequest, FigureSpec,
    StaticChartRenderer, Trace,
};
use propdash::config::AppConfig;
use propdash::data::LoaderError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
default_region = "South East"
default_year = 2022
years = [2020, 2021, 2022]

[data]
data_dir = "processed_data"
boundary_dir = "GeoJSON/regions"

[regions."South East"]
center = { lat = 51.3, lon = -0.6 }
zoom = 7.0

[regions.London]
center = { lat = 51.5, lon = -0.12 }
zoom = 9.0

[regions."North West"]
center = { lat = 53.8, lon = -2.6 }
zoom = 7.5
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn boundaries(names: &[String]) -> String {
    let features: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let lon = -0.5 + i as f64 * 0.01;
            format!(
                r#"{{"type":"Feature","properties":{{"name":"{}"}},"geometry":{{"type":"Polygon","coordinates":[[[{lon},51.0],[{lon2},51.0],[{lon2},51.01],[{lon},51.0]]]}}}}"#,
                name,
                lon = lon,
                lon2 = lon + 0.01
            )
        })
        .collect();
    format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features.join(","))
}

/// South East has 20 priced sectors, London has 30 sectors with deltas,
/// North West has data but no boundary file.
fn dataset() -> (TempDir, AppConfig) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("config.toml"), CONFIG).unwrap();

    let se_sectors: Vec<String> = (1..=20).map(|i| format!("RG{} 1", i)).collect();
    let london_sectors: Vec<String> = (1..=30).map(|i| format!("SW{} 2", i)).collect();

    let mut prices = String::from("region,postcode_sector,avg_price,volume\n");
    for (i, sector) in se_sectors.iter().enumerate() {
        prices.push_str(&format!("South East,{},{},{}\n", sector, 250000 + i * 10000, i + 1));
    }
    prices.push_str("North West,BB1 1,180000,7\n");
    write(root, "processed_data/average_price_by_year/region_data_2022.csv", &prices);

    for year in [2020, 2021, 2022] {
        let mut deltas = String::from("region,postcode_sector,delta\n");
        for (i, sector) in london_sectors.iter().enumerate() {
            // Distinct values, interleaved signs
            let delta = (i as f64 - 15.0) * 0.5 + (year - 2020) as f64 * 0.1;
            deltas.push_str(&format!("London,{},{:.2}\n", sector, delta));
        }
        write(
            root,
            &format!("processed_data/avg_price_delta/avg_price_delta_{}.csv", year),
            &deltas,
        );
    }

    write(
        root,
        "processed_data/region_avg_price/region_avg_prices.csv",
        "region,year,property_type,avg_price,volume\n\
         South East,2021,D,610000,40\n\
         South East,2021,T,340000,55\n\
         South East,2022,D,640000,35\n\
         South East,2022,T,355000,50\n\
         South East,2022,F,240000,20\n",
    );

    write(root, "GeoJSON/regions/South East_postcode_sectors.geojson", &boundaries(&se_sectors));
    write(root, "GeoJSON/regions/London_postcode_sectors.geojson", &boundaries(&london_sectors));

    let config = AppConfig::load_from_file(&root.join("config.toml")).unwrap();
    (dir, config)
}

#[test]
fn south_east_average_price_map() {
    let (_dir, config) = dataset();
    let builder = FigureBuilder::new(&config);
    let fig = builder
        .build(&FigureRequest::new(ChartKind::AveragePriceMap, "South East", 2022))
        .unwrap();

    assert_eq!(fig.locations().len(), 20);
    let [lo, hi] = fig.color_range().unwrap();
    assert!(lo > 250000.0 && hi < 440000.0 && lo < hi);

    let mapbox = fig.layout.mapbox.as_ref().unwrap();
    assert_eq!((mapbox.center.lat, mapbox.center.lon, mapbox.zoom), (51.3, -0.6, 7.0));
    assert_eq!(fig.layout.paper_bgcolor, "#343a40");
}

#[test]
fn london_fastest_growing_top_ten() {
    let (_dir, config) = dataset();
    let builder = FigureBuilder::new(&config);
    let fig = builder
        .build(&FigureRequest::new(ChartKind::FastestGrowingMap, "London", 2021).with_top_n(10))
        .unwrap();

    let Trace::Choroplethmapbox(trace) = &fig.data[0] else {
        panic!("expected a choropleth trace");
    };
    assert_eq!(trace.locations.len(), 10);
    assert!(trace.z.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(trace.locations[0], "SW30 2");

    let declining = builder
        .build(&FigureRequest::new(ChartKind::FastestDecliningMap, "London", 2021).with_top_n(10))
        .unwrap();
    let growing: Vec<&str> = fig.locations();
    assert!(declining.locations().iter().all(|loc| !growing.contains(loc)));
}

#[test]
fn bar_and_box_figures() {
    let (_dir, config) = dataset();
    let builder = FigureBuilder::new(&config);

    let bar = builder.average_price_bar("South East", 2022).unwrap();
    let bar_names: Vec<&str> = bar
        .data
        .iter()
        .filter_map(|t| match t {
            Trace::Bar(b) => Some(b.name.as_str()),
            _ => None,
        })
        .collect();
    assert!(bar_names.contains(&"Detached"));
    assert!(bar_names.contains(&"Terraced"));
    assert!(bar.data.iter().any(|t| matches!(t, Trace::Scatter(_))));

    let boxes = builder.delta_box_plot("London", 2022).unwrap();
    assert_eq!(boxes.data.len(), 3);
    assert!(boxes.layout.yaxis.as_ref().and_then(|a| a.range).is_some());
}

#[test]
fn missing_inputs_surface_as_errors() {
    let (_dir, config) = dataset();
    let builder = FigureBuilder::new(&config);

    let err = builder.average_price_map("North West", 2022).unwrap_err();
    assert!(matches!(err, FigureError::Load(LoaderError::FileNotFound(_))));

    let err = builder.average_price_map("Wales", 2022).unwrap_err();
    assert!(matches!(err, FigureError::UnknownRegion(_)));

    let err = builder.delta_map("South East", 2022).unwrap_err();
    assert!(matches!(err, FigureError::EmptyResult { .. }));
}

#[test]
fn figure_json_written_to_disk() {
    let (dir, config) = dataset();
    let builder = FigureBuilder::new(&config);
    let fig = builder.delta_map("London", 2022).unwrap();

    let path = dir.path().join("out").join("delta-map.json");
    write_figure(&fig, &path, &StaticChartRenderer::default()).unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["data"][0]["type"], "choroplethmapbox");
    assert_eq!(value["data"][0]["locations"].as_array().unwrap().len(), 30);
    assert_eq!(value["layout"]["mapbox"]["style"], "carto-positron");

    // A placeholder keeps the page layout intact
    let placeholder = FigureSpec::placeholder(builder.delta_map("Wales", 2022).unwrap_err());
    assert!(placeholder.is_empty());
    assert!(placeholder.title().contains("Wales"));
}
