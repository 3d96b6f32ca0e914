// src/ui.rs
use crate::chain::{FrameClock, Pendulum, Representation}; // Chain object and its frame-timestamp helper
use crate::config::ChainConfig; // Chain parameters accepted as JSON
use crate::error::ChainError; // Engine errors, mapped to HTTP statuses below
use crate::logic::ChainSolver; // Batch integration for /api/simulate
use crate::math::{forward_kinematics, Energy, Point}; // Energy report, joint positions
use crate::plot::{plot_limit, render_png_data_url}; // PNG rendering of a chain and its trail
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError}; // Actix-web types for handlers and errors
use log::{debug, info, warn}; // Logging facade
use serde::{Deserialize, Serialize}; // Serde traits for JSON (de)serialization
use std::collections::HashMap; // Chain id -> session
use std::io; // Render failures surface as io::Error
use std::sync::atomic::{AtomicU64, Ordering}; // Id allocation
use tokio::sync::Mutex; // Async-aware lock around the registry

/// Errors a handler can return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("no chain with id {0}")]
    NotFound(u64),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("render failed: {0}")]
    Render(#[from] io::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool, // Always false
    error: String, // Display form of the error
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Chain(ChainError::DegenerateSolve(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Chain(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            error: self.to_string(),
        })
    }
}

/// One hosted chain plus the clock that turns client timestamps into steps.
struct Session {
    pendulum: Pendulum,
    clock: FrameClock,
}

/// In-memory set of independent chains, shared by all workers.
#[derive(Default)]
pub struct ChainRegistry {
    next_id: AtomicU64,
    chains: Mutex<HashMap<u64, Session>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live chains.
    pub async fn len(&self) -> usize {
        self.chains.lock().await.len()
    }

    async fn insert(&self, pendulum: Pendulum) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.chains.lock().await.insert(
            id,
            Session {
                pendulum,
                clock: FrameClock::new(),
            },
        );
        id
    }

    /// Runs `f` on the session under the lock.
    async fn with_session<T>(
        &self,
        id: u64,
        f: impl FnOnce(&mut Session) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut chains = self.chains.lock().await;
        let session = chains.get_mut(&id).ok_or(ApiError::NotFound(id))?;
        f(session)
    }
}

fn xy(p: &Point) -> [f64; 2] {
    [p.x, p.y]
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChainView {
    pub success: bool,
    pub id: u64,
    pub config: ChainConfig,
    pub representation: Representation,
    pub positions: Vec<[f64; 2]>, // Anchor first
    pub angles: Vec<f64>,
    pub velocities: Vec<f64>,
    pub energy: EnergyView,
    pub trace_len: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnergyView {
    pub kinetic: f64,
    pub potential: f64,
    pub total: f64,
}

impl From<Energy> for EnergyView {
    fn from(e: Energy) -> Self {
        Self {
            kinetic: e.kinetic,
            potential: e.potential,
            total: e.total(),
        }
    }
}

impl ChainView {
    fn of(id: u64, p: &Pendulum) -> Self {
        Self {
            success: true,
            id,
            config: p.config().clone(),
            representation: p.representation(),
            positions: p.positions().iter().map(xy).collect(),
            angles: p.angles().to_vec(),
            velocities: p.velocities().to_vec(),
            energy: p.energy().into(),
            trace_len: p.trace().len(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TickRequest {
    dt: Option<f64>,        // Step length in seconds
    timestamp: Option<f64>, // Or a frame timestamp in milliseconds
}

#[derive(Debug, Deserialize)]
pub struct DragRequest {
    joint: usize, // 0 = anchor, link_count = free end
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
pub struct LinksRequest {
    link_count: usize,
}

#[derive(Serialize)]
struct TraceResponse {
    success: bool,
    limit: usize,
    snapshots: Vec<Vec<[f64; 2]>>, // Oldest first
}

#[derive(Serialize)]
struct PlotResponse {
    success: bool,
    image: String, // PNG data URL
}

pub async fn create_chain(
    registry: web::Data<ChainRegistry>,
    config: web::Json<ChainConfig>,
) -> Result<HttpResponse, ApiError> {
    let pendulum = Pendulum::new(config.into_inner())?;
    let id = registry.insert(pendulum.clone()).await;
    info!(
        "created chain {id} with {} links ({} live)",
        pendulum.link_count(),
        registry.len().await
    );
    Ok(HttpResponse::Created().json(ChainView::of(id, &pendulum)))
}

pub async fn get_chain(
    registry: web::Data<ChainRegistry>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let view = registry
        .with_session(id, |s| Ok(ChainView::of(id, &s.pendulum)))
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn delete_chain(
    registry: web::Data<ChainRegistry>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    match registry.chains.lock().await.remove(&id) {
        Some(_) => {
            info!("dropped chain {id}");
            Ok(HttpResponse::NoContent().finish())
        }
        None => Err(ApiError::NotFound(id)),
    }
}

pub async fn tick_chain(
    registry: web::Data<ChainRegistry>,
    path: web::Path<u64>,
    body: web::Json<TickRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let view = registry
        .with_session(id, |s| {
            let dt = match (body.dt, body.timestamp) {
                (Some(dt), _) => Some(dt),
                (None, Some(ts)) => s.clock.delta(ts), // First frame only primes the clock
                (None, None) => {
                    return Err(ApiError::BadRequest("tick needs `dt` or `timestamp`".into()))
                }
            };
            if let Some(dt) = dt {
                s.pendulum.tick(dt)?;
            }
            Ok(ChainView::of(id, &s.pendulum))
        })
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn drag_chain(
    registry: web::Data<ChainRegistry>,
    path: web::Path<u64>,
    body: web::Json<DragRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let view = registry
        .with_session(id, |s| {
            s.pendulum.drag_to(body.joint, body.x, body.y)?;
            Ok(ChainView::of(id, &s.pendulum))
        })
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn record_trace(
    registry: web::Data<ChainRegistry>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let view = registry
        .with_session(id, |s| {
            s.pendulum.record_trace();
            Ok(ChainView::of(id, &s.pendulum))
        })
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn get_trace(
    registry: web::Data<ChainRegistry>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let body = registry
        .with_session(id, |s| {
            let trace = s.pendulum.trace();
            Ok(TraceResponse {
                success: true,
                limit: trace.limit(),
                snapshots: trace.iter().map(|snap| snap.iter().map(xy).collect()).collect(),
            })
        })
        .await?;
    Ok(HttpResponse::Ok().json(body))
}

pub async fn set_links(
    registry: web::Data<ChainRegistry>,
    path: web::Path<u64>,
    body: web::Json<LinksRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let view = registry
        .with_session(id, |s| {
            s.pendulum.set_link_count(body.link_count);
            s.clock.reset();
            Ok(ChainView::of(id, &s.pendulum))
        })
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn plot_chain(
    registry: web::Data<ChainRegistry>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    // Copy out under the lock, render outside it.
    let (snapshot, trail, limit, n) = registry
        .with_session(id, |s| {
            let p = &s.pendulum;
            Ok((
                p.positions(),
                p.trace().end_effector_path(),
                plot_limit(p.link_count(), p.link_length()),
                p.link_count(),
            ))
        })
        .await?;
    let caption = format!("Chain {id} (n={n})");
    let image = render_off_thread(snapshot, trail, limit, caption).await?;
    Ok(HttpResponse::Ok().json(PlotResponse {
        success: true,
        image,
    }))
}

/// Renders on the blocking pool. Without usable fonts the captioned plot
/// fails, so the frame is drawn again bare rather than failing the request.
async fn render_off_thread(
    snapshot: Vec<Point>,
    trail: Vec<Point>,
    limit: f64,
    caption: String,
) -> Result<String, ApiError> {
    let image = web::block(move || {
        render_png_data_url(&snapshot, &trail, limit, Some(caption.as_str())).or_else(|err| {
            warn!("captioned render failed ({err}), drawing without text");
            render_png_data_url(&snapshot, &trail, limit, None)
        })
    })
    .await
    .map_err(|e| io::Error::other(e.to_string()))??;
    Ok(image)
}

/// Largest `n_points` `/api/simulate` will produce.
pub const MAX_SIM_POINTS: usize = 10_000;

#[derive(Deserialize)]
pub struct SimParams {
    link_count: usize,      // Number of links
    link_length: f64,       // Uniform link length
    #[serde(default = "default_gravity")]
    gravity: f64,           // Gravitational acceleration
    initial_angles: String, // Comma-separated initial angles (degrees) as a string
    t_max: f64,             // Simulated duration in seconds
    n_points: usize,        // Number of samples, the initial state included
}

fn default_gravity() -> f64 {
    ChainConfig::default().gravity
}

#[derive(Serialize)]
struct SimResponse {
    success: bool,                 // Whether the simulation succeeded
    trajectory_image: String,      // Base64-encoded PNG image of the end trail
    animation_data: AnimationData, // Raw position data for frontend animation
}

#[derive(Serialize)]
struct AnimationData {
    positions: Vec<Vec<f64>>, // Positions over time: [x1, y1, x2, y2, ...], anchor omitted
    n: usize,                 // Number of links
    limit: f64,               // Plot boundary limit for consistent scaling
}

/// Runs a fresh chain from rest and returns every frame plus a picture of the trail.
pub async fn simulate_handler(params: web::Json<SimParams>) -> Result<HttpResponse, ApiError> {
    let params = params.into_inner();

    // Parse initial angles (degrees) and convert to radians
    let initial_angles: Vec<f64> = params
        .initial_angles
        .split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .map(f64::to_radians)
        .collect();

    if initial_angles.len() != params.link_count {
        return Err(ApiError::BadRequest(format!(
            "expected {} initial angles, got {}",
            params.link_count,
            initial_angles.len()
        )));
    }
    if !(2..=MAX_SIM_POINTS).contains(&params.n_points) {
        return Err(ApiError::BadRequest(format!(
            "n_points must be between 2 and {MAX_SIM_POINTS}, got {}",
            params.n_points
        )));
    }

    let config = ChainConfig {
        link_count: params.link_count,
        link_length: params.link_length,
        gravity: params.gravity,
        ..ChainConfig::default()
    };
    config.validate()?;
    let solver = ChainSolver::new(config.gravity, config.link_length, config.max_step);
    let dt = params.t_max / (params.n_points - 1) as f64; // Fixed step, like linspace(0, t_max, n_points)
    let steps = params.n_points - 1;
    debug!(
        "simulating {} links for {}s in {steps} steps",
        params.link_count, params.t_max
    );

    // Integration can take a while; keep it off the async workers.
    let frames = web::block(move || solver.solve(&initial_angles, dt, steps))
        .await
        .map_err(|e| io::Error::other(e.to_string()))??;

    let joints: Vec<Vec<Point>> = frames
        .iter()
        .map(|angles| forward_kinematics(angles, config.link_length))
        .collect();
    let positions: Vec<Vec<f64>> = joints
        .iter()
        .map(|frame| frame.iter().skip(1).flat_map(|q| [q.x, q.y]).collect())
        .collect();
    let trail: Vec<Point> = joints.iter().filter_map(|frame| frame.last().copied()).collect();
    let snapshot = joints.last().cloned().unwrap_or_else(|| vec![Point::origin()]);

    let limit = plot_limit(params.link_count, params.link_length);
    let caption = format!("Trajectories (n={})", params.link_count);
    let trajectory_image = render_off_thread(snapshot, trail, limit, caption).await?;

    Ok(HttpResponse::Ok().json(SimResponse {
        success: true,
        trajectory_image,
        animation_data: AnimationData {
            positions,
            n: params.link_count,
            limit,
        },
    }))
}

/// Mounts every route under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/simulate", web::post().to(simulate_handler))
            .route("/chains", web::post().to(create_chain))
            .route("/chains/{id}", web::get().to(get_chain))
            .route("/chains/{id}", web::delete().to(delete_chain))
            .route("/chains/{id}/tick", web::post().to(tick_chain))
            .route("/chains/{id}/drag", web::post().to(drag_chain))
            .route("/chains/{id}/trace", web::post().to(record_trace))
            .route("/chains/{id}/trace", web::get().to(get_trace))
            .route("/chains/{id}/links", web::put().to(set_links))
            .route("/chains/{id}/plot", web::get().to(plot_chain)),
    );
}
