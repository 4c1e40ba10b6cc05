use std::{future::IntoFuture, process, sync::Arc};

use coursepages::{
    application::{error::AppError, repos::StudentRepo},
    config,
    domain::course::UnitKind,
    infra::{
        bootstrap::ApplicationContext, course_file, course_reload::CourseReloader, error::InfraError,
        http, memory::InMemoryStudentRepo, telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command_or_serve() {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckCourse(_) => run_check_course(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let course = course_file::load_course_file(&settings.course.path).await?;
    let students: Arc<dyn StudentRepo> = Arc::new(InMemoryStudentRepo::new());
    let ApplicationContext {
        http_state,
        warmer,
        reloader,
    } = ApplicationContext::build(&settings, course, students);

    if settings.cache.warm_on_start {
        if !settings.cache.enabled {
            warn!(
                target = "coursepages::startup",
                "cache warm-up requested but the page cache is disabled"
            );
        } else if let Err(err) = warmer.warm_initial().await {
            warn!(target = "coursepages::startup", error = %err, "cache warm-up failed");
        }
    }

    reload_on_hangup(reloader);
    serve_http(&settings, http_state).await
}

/// Re-read the course outline on every SIGHUP.
#[cfg(unix)]
fn reload_on_hangup(reloader: CourseReloader) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(target = "coursepages::startup", error = %err, "course reload on SIGHUP unavailable");
            return;
        }
    };
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            if let Err(err) = reloader.reload().await {
                warn!(target = "coursepages::course_reload", error = %err, "course reload rejected");
            }
        }
    });
}

#[cfg(not(unix))]
fn reload_on_hangup(_reloader: CourseReloader) {}

async fn run_check_course(settings: config::Settings) -> Result<(), AppError> {
    let course = course_file::load_course_file(&settings.course.path).await?;
    let assessments = course
        .units
        .iter()
        .filter(|unit| unit.kind == UnitKind::Assessment)
        .count();
    info!(
        target = "coursepages::check_course",
        path = %settings.course.path.display(),
        title = %course.title,
        units = course.units.len(),
        lessons = course.lessons.len(),
        assessments,
        "course outline is valid"
    );
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: http::HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "coursepages::startup",
        addr = %settings.server.addr,
        cache_enabled = settings.cache.enabled,
        "listening"
    );

    let stop = Arc::new(Notify::new());
    let stopped = stop.clone();
    let mut server = tokio::spawn(
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { stopped.notified().await })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => return finish(joined),
        () = shutdown_signal() => stop.notify_one(),
    }

    info!(
        target = "coursepages::shutdown",
        grace_secs = settings.server.graceful_shutdown.as_secs(),
        "draining connections"
    );
    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => finish(joined),
        Err(_) => {
            warn!(target = "coursepages::shutdown", "graceful shutdown timed out");
            server.abort();
            Ok(())
        }
    }
}

fn finish(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = "coursepages::shutdown", error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
