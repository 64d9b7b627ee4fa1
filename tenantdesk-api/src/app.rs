/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use tenantdesk_api::{app::{build_router, AppState}, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::from_config(pool, config)?;
///
/// let app = build_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::security::SecurityHeadersLayer,
    routes,
    services::{
        images::{CloudinaryStore, ImageStore},
        mailer::Mailer,
    },
};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tenantdesk_shared::auth::{
    middleware::{jwt_auth_middleware, AuthError},
    session::SessionConfig,
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Request bodies above this are rejected; leaves room for a 5 MiB image
const BODY_LIMIT_BYTES: usize = 6 * 1024 * 1024;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub session: Arc<SessionConfig>,
    pub mailer: Mailer,

    /// None when Cloudinary is not configured
    pub images: Option<Arc<dyn ImageStore>>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        config: Config,
        mailer: Mailer,
        images: Option<Arc<dyn ImageStore>>,
    ) -> Self {
        Self {
            db,
            session: Arc::new(config.session()),
            config: Arc::new(config),
            mailer,
            images,
        }
    }

    /// Builds the mailer and image store the configuration asks for
    pub fn from_config(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let mailer = Mailer::from_config(&config.mail)?;
        let images = match &config.cloudinary {
            Some(cloudinary) => {
                Some(Arc::new(CloudinaryStore::new(cloudinary.clone())?) as Arc<dyn ImageStore>)
            }
            None => None,
        };

        Ok(Self::new(db, config, mailer, images))
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn image_store(&self) -> Result<&dyn ImageStore, ApiError> {
        self.images
            .as_deref()
            .ok_or_else(|| ApiError::ServiceUnavailable("Image uploads are not configured".to_string()))
    }
}

/// Builds the complete router
///
/// ```text
/// /health
/// /v1
/// ├── /auth                      register, login, select-tenant, refresh,
/// │                              logout, verify-email, forgot-password,
/// │                              reset-password (public);
/// │                              switch-tenant, resend-verification, me
/// ├── /me                        profile and avatar
/// └── /tenants
///     ├── /                      create, list
///     └── /:tenant_id
///         ├── /users             members and roles
///         ├── /invitations
///         ├── /projects/:project_id/{sprints,tasks,boards}
///         ├── /tasks/:task_id/comments
///         ├── /teams
///         ├── /events
///         ├── /supplies
///         └── /reorders
/// ```
///
/// Everything except `/health` and the public auth routes sits behind the
/// JWT layer. Tenant routes additionally resolve a `TenantScope`. Responses
/// are gzip or brotli encoded when the client accepts it.
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/select-tenant", post(routes::auth::select_tenant))
        .route("/refresh", post(routes::auth::refresh))
        .route("/logout", post(routes::auth::logout))
        .route("/verify-email", post(routes::auth::verify_email))
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route("/reset-password", post(routes::auth::reset_password));

    let session_auth_routes = Router::new()
        .route("/switch-tenant", post(routes::auth::switch_tenant))
        .route("/resend-verification", post(routes::auth::resend_verification))
        .route("/me", get(routes::auth::me));

    let me_routes = Router::new()
        .route("/", put(routes::me::update_me))
        .route(
            "/profile",
            get(routes::me::get_profile).put(routes::me::update_profile),
        )
        .route("/avatar", post(routes::me::upload_avatar));

    let tenant_routes = Router::new()
        .route(
            "/",
            post(routes::tenants::create_tenant).get(routes::tenants::list_tenants),
        )
        .route(
            "/:tenant_id",
            get(routes::tenants::get_tenant)
                .put(routes::tenants::update_tenant)
                .delete(routes::tenants::delete_tenant),
        )
        // Members
        .route("/:tenant_id/users", get(routes::users::list_members))
        .route(
            "/:tenant_id/users/:user_id",
            get(routes::users::get_member).delete(routes::users::remove_member),
        )
        .route(
            "/:tenant_id/users/:user_id/role",
            put(routes::users::update_member_role),
        )
        // Invitations
        .route(
            "/:tenant_id/invitations",
            post(routes::invitations::create_invitation).get(routes::invitations::list_invitations),
        )
        .route(
            "/:tenant_id/invitations/:invitation_id",
            delete(routes::invitations::revoke_invitation),
        )
        // Projects
        .route(
            "/:tenant_id/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/:tenant_id/projects/:project_id",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        // Sprints
        .route(
            "/:tenant_id/projects/:project_id/sprints",
            get(routes::sprints::list_sprints).post(routes::sprints::create_sprint),
        )
        .route(
            "/:tenant_id/projects/:project_id/sprints/:sprint_id",
            get(routes::sprints::get_sprint)
                .put(routes::sprints::update_sprint)
                .delete(routes::sprints::delete_sprint),
        )
        .route(
            "/:tenant_id/projects/:project_id/sprints/:sprint_id/start",
            post(routes::sprints::start_sprint),
        )
        .route(
            "/:tenant_id/projects/:project_id/sprints/:sprint_id/complete",
            post(routes::sprints::complete_sprint),
        )
        // Tasks
        .route(
            "/:tenant_id/projects/:project_id/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/:tenant_id/projects/:project_id/tasks/:task_id",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        // Boards
        .route(
            "/:tenant_id/projects/:project_id/boards",
            get(routes::boards::list_boards).post(routes::boards::create_board),
        )
        .route(
            "/:tenant_id/projects/:project_id/boards/:board_id",
            get(routes::boards::get_board)
                .put(routes::boards::update_board)
                .delete(routes::boards::delete_board),
        )
        .route(
            "/:tenant_id/projects/:project_id/boards/:board_id/tasks/:task_id",
            put(routes::boards::place_task).delete(routes::boards::remove_task),
        )
        // Comments
        .route(
            "/:tenant_id/tasks/:task_id/comments",
            get(routes::comments::list_comments).post(routes::comments::create_comment),
        )
        .route(
            "/:tenant_id/tasks/:task_id/comments/:comment_id",
            put(routes::comments::update_comment).delete(routes::comments::delete_comment),
        )
        // Teams
        .route(
            "/:tenant_id/teams",
            get(routes::teams::list_teams).post(routes::teams::create_team),
        )
        .route(
            "/:tenant_id/teams/:team_id",
            get(routes::teams::get_team)
                .put(routes::teams::update_team)
                .delete(routes::teams::delete_team),
        )
        .route("/:tenant_id/teams/:team_id/members", get(routes::teams::list_members))
        .route(
            "/:tenant_id/teams/:team_id/members/:user_id",
            put(routes::teams::put_member).delete(routes::teams::remove_member),
        )
        .route("/:tenant_id/teams/:team_id/tasks", get(routes::teams::list_tasks))
        .route(
            "/:tenant_id/teams/:team_id/tasks/:task_id",
            put(routes::teams::assign_task).delete(routes::teams::unassign_task),
        )
        // Activity
        .route("/:tenant_id/events", get(routes::events::list_events))
        // Inventory
        .route(
            "/:tenant_id/supplies",
            get(routes::supplies::list_supplies).post(routes::supplies::create_supply),
        )
        .route("/:tenant_id/supplies/low-stock", get(routes::supplies::low_stock))
        .route(
            "/:tenant_id/supplies/:supply_id",
            get(routes::supplies::get_supply)
                .put(routes::supplies::update_supply)
                .delete(routes::supplies::delete_supply),
        )
        .route(
            "/:tenant_id/supplies/:supply_id/adjust",
            post(routes::supplies::adjust_stock),
        )
        .route(
            "/:tenant_id/supplies/:supply_id/image",
            post(routes::supplies::upload_image),
        )
        // Reorders
        .route(
            "/:tenant_id/reorders",
            get(routes::reorders::list_reorders).post(routes::reorders::create_reorder),
        )
        .route("/:tenant_id/reorders/auto", post(routes::reorders::auto_reorder))
        .route(
            "/:tenant_id/reorders/:reorder_id",
            get(routes::reorders::get_reorder).delete(routes::reorders::delete_reorder),
        )
        .route(
            "/:tenant_id/reorders/:reorder_id/status",
            put(routes::reorders::update_status),
        )
        .route(
            "/:tenant_id/reorders/:reorder_id/receive",
            post(routes::reorders::receive),
        );

    let protected_routes = Router::new()
        .nest("/auth", session_auth_routes)
        .nest("/me", me_routes)
        .nest("/tenants", tenant_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_layer));

    let v1_routes = Router::new()
        .nest("/auth", public_auth_routes)
        .merge(protected_routes);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Validates the bearer token and inserts an `AuthContext`
async fn jwt_auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    jwt_auth_middleware(state.jwt_secret().to_string(), req, next).await
}
