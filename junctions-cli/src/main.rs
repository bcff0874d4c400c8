use clap::Parser;
use junctions::image::io::load_gray_image;
use junctions::matcher::{
    build_reference_grid, determine_aligned_matching, determine_shapes_along_lines,
};
use junctions::{
    detect_aligned_rectangles, determine_shapes, post_adjust_shapes, AlignedMatchingParams,
    FiniteLine2, GradientDetector, GradientDetectorConfig, GradientVarianceConfig,
    GradientVarianceDetector, Homography, JunctionDetector, JunctionTemplate, OwnedImage,
    RectangleParams, ShapeParams, ShapeSet, ShapeView, VarianceDetector, VarianceDetectorConfig,
    Vec2,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Junctions CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DetectorKind {
    Gradient,
    Variance,
    #[default]
    GradientVariance,
    None,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TemplateJson {
    shape_width: u32,
    shape_height: u32,
    step_size: u32,
    top_band: u32,
    bottom_band: u32,
}

impl Default for TemplateJson {
    fn default() -> Self {
        let t = JunctionTemplate::default();
        Self {
            shape_width: t.shape_width,
            shape_height: t.shape_height,
            step_size: t.step_size,
            top_band: t.top_band,
            bottom_band: t.bottom_band,
        }
    }
}

impl From<&TemplateJson> for JunctionTemplate {
    fn from(value: &TemplateJson) -> Self {
        Self {
            shape_width: value.shape_width,
            shape_height: value.shape_height,
            step_size: value.step_size,
            top_band: value.top_band,
            bottom_band: value.bottom_band,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GradientJson {
    sign: i32,
    threshold: f64,
    minimal_delta: u32,
    parallel: bool,
    template: TemplateJson,
}

impl Default for GradientJson {
    fn default() -> Self {
        let cfg = GradientDetectorConfig::default();
        Self {
            sign: cfg.sign,
            threshold: cfg.threshold,
            minimal_delta: cfg.minimal_delta,
            parallel: cfg.parallel,
            template: TemplateJson::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct VarianceJson {
    threshold: f32,
    parallel: bool,
    template: TemplateJson,
}

impl Default for VarianceJson {
    fn default() -> Self {
        let cfg = VarianceDetectorConfig::default();
        Self {
            threshold: cfg.threshold,
            parallel: cfg.parallel,
            template: TemplateJson::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GradientVarianceJson {
    sign: i32,
    threshold: f32,
    parallel: bool,
}

impl Default for GradientVarianceJson {
    fn default() -> Self {
        let cfg = GradientVarianceConfig::default();
        Self {
            sign: cfg.sign,
            threshold: cfg.threshold,
            parallel: cfg.parallel,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ShapesJson {
    short_distance: f32,
    long_distance: f32,
    shape_angle_deg: f32,
    x_angle_deg: f32,
    similar_distance: f32,
    similar_angle_deg: f32,
}

impl Default for ShapesJson {
    fn default() -> Self {
        let params = ShapeParams::default();
        Self {
            short_distance: params.short_distance,
            long_distance: params.long_distance,
            shape_angle_deg: params.shape_angle_deg,
            x_angle_deg: params.x_angle_deg,
            similar_distance: 1.5,
            similar_angle_deg: 15.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RectangleJson {
    rectangle_width: u32,
    aspect_ratio: f32,
    aspect_tolerance: f32,
    alignment_angle_deg: f32,
    sort: bool,
    border_distance: f32,
    perpendicular_distance: u32,
}

impl Default for RectangleJson {
    fn default() -> Self {
        let params = RectangleParams::default();
        Self {
            rectangle_width: params.rectangle_width,
            aspect_ratio: params.aspect_ratio,
            aspect_tolerance: params.aspect_tolerance,
            alignment_angle_deg: params.alignment_angle_deg,
            sort: params.sort,
            border_distance: params.border_distance,
            perpendicular_distance: params.perpendicular_distance,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MatchingJson {
    maximal_distance: f32,
    angle_threshold_deg: f32,
    ambiguity_ratio: f32,
    candidate_offset: [f32; 2],
    /// Row-major 3x3 matrix mapping candidate into reference coordinates.
    homography: Option<[f32; 9]>,
}

impl Default for MatchingJson {
    fn default() -> Self {
        let params = AlignedMatchingParams::default();
        Self {
            maximal_distance: params.maximal_distance,
            angle_threshold_deg: params.angle_threshold_deg,
            ambiguity_ratio: params.ambiguity_ratio,
            candidate_offset: [params.candidate_offset.x, params.candidate_offset.y],
            homography: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LineGroupsJson {
    minimal_shapes: usize,
    fit_lines: bool,
}

impl Default for LineGroupsJson {
    fn default() -> Self {
        Self {
            minimal_shapes: 5,
            fit_lines: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    image_path: String,
    /// Frame size; required for `.raw` frames, checked against decoded ones.
    width: usize,
    height: usize,
    detector: DetectorKind,
    gradient: GradientJson,
    variance: VarianceJson,
    gradient_variance: GradientVarianceJson,
    lines_path: Option<String>,
    shapes: ShapesJson,
    rectangle: Option<RectangleJson>,
    reference_path: Option<String>,
    matching: MatchingJson,
    line_groups: Option<LineGroupsJson>,
    output_path: Option<String>,
}

/// Segments as `[x0, y0, x1, y1]`, split by orientation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LinesJson {
    horizontal: Vec<[f32; 4]>,
    vertical: Vec<[f32; 4]>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ShapeRecord {
    L {
        x: f32,
        y: f32,
        direction: [f32; 2],
        score: f32,
    },
    T {
        x: f32,
        y: f32,
        direction: [f32; 2],
        score: f32,
    },
    X {
        x: f32,
        y: f32,
        directions: [[f32; 2]; 2],
        score: f32,
    },
}

impl From<ShapeView<'_>> for ShapeRecord {
    fn from(shape: ShapeView<'_>) -> Self {
        let p = shape.position();
        let score = shape.score();
        match shape {
            ShapeView::L(l) => ShapeRecord::L {
                x: p.x,
                y: p.y,
                direction: pair(&l.direction),
                score,
            },
            ShapeView::T(t) => ShapeRecord::T {
                x: p.x,
                y: p.y,
                direction: pair(&t.direction),
                score,
            },
            ShapeView::X(x) => ShapeRecord::X {
                x: p.x,
                y: p.y,
                directions: [pair(&x.direction0), pair(&x.direction1)],
                score,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct MatchRecord {
    reference: usize,
    candidate: usize,
}

#[derive(Debug, Serialize)]
struct MatchingOutput {
    matches: Vec<MatchRecord>,
    unmatched_references: Vec<u32>,
    unmatched_candidates: Vec<u32>,
    average_sqr_distance: Option<f32>,
}

#[derive(Debug, Serialize)]
struct LineGroupRecord {
    shapes: Vec<u32>,
    /// Unit normal and distance of `normal . p = distance`.
    normal: Option<[f32; 2]>,
    distance: Option<f32>,
}

#[derive(Debug, Default, Serialize)]
struct Output {
    shapes: Vec<ShapeRecord>,
    geometric_shapes: Vec<ShapeRecord>,
    rectangles: Vec<[[f32; 2]; 4]>,
    matching: Option<MatchingOutput>,
    line_groups: Vec<LineGroupRecord>,
}

fn pair(v: &Vec2) -> [f32; 2] {
    [v.x, v.y]
}

fn segment(values: &[f32; 4]) -> FiniteLine2 {
    FiniteLine2::new(Vec2::new(values[0], values[1]), Vec2::new(values[2], values[3]))
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Decodes PNG/JPEG frames; `.raw` files are headerless 8-bit frames whose
/// size comes from the config.
fn load_frame(path: &Path, width: usize, height: usize) -> CliResult<OwnedImage> {
    let is_raw = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("raw"));
    if !is_raw {
        let image = load_gray_image(path)?;
        if width != 0 && height != 0 && (image.width(), image.height()) != (width, height) {
            return Err(format!(
                "{}: frame is {}x{}, config expects {width}x{height}",
                path.display(),
                image.width(),
                image.height()
            )
            .into());
        }
        return Ok(image);
    }

    if width == 0 || height == 0 {
        return Err("width and height must be set for .raw frames".into());
    }
    let data = fs::read(path)?;
    if data.len() != width * height {
        return Err(format!(
            "{}: expected {} bytes for a {width}x{height} frame, found {}",
            path.display(),
            width * height,
            data.len()
        )
        .into());
    }
    Ok(OwnedImage::new(data, width, height)?)
}

fn build_detector(config: &Config) -> CliResult<Option<Box<dyn JunctionDetector>>> {
    let detector: Box<dyn JunctionDetector> = match config.detector {
        DetectorKind::None => return Ok(None),
        DetectorKind::Gradient => Box::new(GradientDetector::new(GradientDetectorConfig {
            sign: config.gradient.sign,
            threshold: config.gradient.threshold,
            template: (&config.gradient.template).into(),
            minimal_delta: config.gradient.minimal_delta,
            parallel: config.gradient.parallel,
        })?),
        DetectorKind::Variance => Box::new(VarianceDetector::new(VarianceDetectorConfig {
            threshold: config.variance.threshold,
            template: (&config.variance.template).into(),
            parallel: config.variance.parallel,
        })?),
        DetectorKind::GradientVariance => {
            Box::new(GradientVarianceDetector::new(GradientVarianceConfig {
                sign: config.gradient_variance.sign,
                threshold: config.gradient_variance.threshold,
                parallel: config.gradient_variance.parallel,
                ..GradientVarianceConfig::default()
            })?)
        }
    };
    Ok(Some(detector))
}

fn geometric_path(
    config: &Config,
    image: &OwnedImage,
    lines_path: &str,
    output: &mut Output,
) -> CliResult<()> {
    let lines: LinesJson = serde_json::from_str(&fs::read_to_string(lines_path)?)?;
    let horizontal: Vec<FiniteLine2> = lines.horizontal.iter().map(segment).collect();
    let vertical: Vec<FiniteLine2> = lines.vertical.iter().map(segment).collect();

    let s = &config.shapes;
    let params = ShapeParams {
        short_distance: s.short_distance,
        long_distance: s.long_distance,
        shape_angle_deg: s.shape_angle_deg,
        x_angle_deg: s.x_angle_deg,
    };
    let mut shapes = determine_shapes(&horizontal, &vertical, &params);
    post_adjust_shapes(
        image.width(),
        image.height(),
        &mut shapes,
        s.similar_distance,
        s.similar_angle_deg,
    );
    output.geometric_shapes = records(&shapes);

    if let Some(r) = &config.rectangle {
        let params = RectangleParams {
            rectangle_width: r.rectangle_width,
            aspect_ratio: r.aspect_ratio,
            aspect_tolerance: r.aspect_tolerance,
            alignment_angle_deg: r.alignment_angle_deg,
            sort: r.sort,
            border_distance: r.border_distance,
            perpendicular_distance: r.perpendicular_distance,
        };
        let all: Vec<FiniteLine2> = horizontal.into_iter().chain(vertical).collect();
        output.rectangles = detect_aligned_rectangles(image.view(), &all, &params)?
            .into_iter()
            .map(|corners| corners.map(|c| pair(&c)))
            .collect();
    }
    Ok(())
}

fn records(shapes: &ShapeSet) -> Vec<ShapeRecord> {
    shapes.serialize().shapes.into_iter().map(ShapeRecord::from).collect()
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("junctions=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.image_path.is_empty() {
        return Err("image_path must be set in the config".into());
    }

    let image = load_frame(Path::new(&config.image_path), config.width, config.height)?;
    let (width, height) = (image.width(), image.height());
    let detector = build_detector(&config)?;
    let mut output = Output::default();

    let shapes = match &detector {
        Some(detector) => detector.detect_shapes(image.view())?,
        None => ShapeSet::new(),
    };
    tracing::info!(shapes = shapes.len(), "detected junctions");
    output.shapes = records(&shapes);

    if let Some(lines_path) = &config.lines_path {
        geometric_path(&config, &image, lines_path, &mut output)?;
    }

    let serialized = shapes.serialize();
    if let (Some(reference_path), Some(detector)) = (&config.reference_path, &detector) {
        let reference_image = load_frame(Path::new(reference_path), width, height)?;
        let reference_shapes = detector.detect_shapes(reference_image.view())?;
        let reference = reference_shapes.serialize();

        let m = &config.matching;
        let params = AlignedMatchingParams {
            maximal_distance: m.maximal_distance,
            angle_threshold_deg: m.angle_threshold_deg,
            ambiguity_ratio: m.ambiguity_ratio,
            candidate_offset: Vec2::new(m.candidate_offset[0], m.candidate_offset[1]),
            homography: m.homography.as_ref().map(Homography::from_row_slice),
        };
        let grid = build_reference_grid(&reference.shapes, width, height, m.maximal_distance);
        let result =
            determine_aligned_matching(&reference.shapes, &grid, &serialized.shapes, &params);
        output.matching = Some(MatchingOutput {
            matches: result
                .matches
                .iter()
                .map(|&(r, c)| MatchRecord {
                    reference: r as usize,
                    candidate: c as usize,
                })
                .collect(),
            unmatched_references: result.unmatched_references,
            unmatched_candidates: result.unmatched_candidates,
            average_sqr_distance: result.average_sqr_distance,
        });
    }

    if let Some(groups) = &config.line_groups {
        output.line_groups = determine_shapes_along_lines(
            width,
            height,
            &serialized.shapes,
            groups.minimal_shapes,
            groups.fit_lines,
        )?
        .into_iter()
        .map(|group| LineGroupRecord {
            shapes: group.indices,
            normal: group.line.map(|l| pair(&l.normal())),
            distance: group.line.map(|l| l.distance()),
        })
        .collect();
    }

    let json = serde_json::to_string_pretty(&output)?;
    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
