use anyhow::Context;
use foodatlas::{
    api::routes::create_router,
    cli::{
        commands,
        init::{self, InitConfig, InitResult},
        output::Output,
        Cli, Commands,
    },
    utils::telemetry,
    AppState, AtlasConfigManager,
};
use std::{path::Path, process::ExitCode, sync::Arc};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match run(cli, &output).await {
        Ok(code) => code,
        Err(e) => {
            output.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, output: &Output) -> anyhow::Result<ExitCode> {
    match cli.command {
        Some(Commands::Init {
            path,
            force,
            warehouse,
        }) => {
            let result = init::run(
                InitConfig {
                    path,
                    force,
                    warehouse,
                },
                output,
            );
            Ok(match result {
                InitResult::Success => ExitCode::SUCCESS,
                InitResult::AlreadyExists | InitResult::Error(_) => ExitCode::FAILURE,
            })
        }

        Some(Commands::Token { user, email, ttl }) => {
            let config = commands::load_unvalidated(&cli.config)?;
            let token = commands::mint_token(&config, &user, &email, ttl)?;
            println!("{}", token);
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Config { validate }) => {
            let config = commands::load_unvalidated(&cli.config)?;
            commands::show_config(&config, &cli.config, output);
            if validate {
                output.newline();
                match config.validate() {
                    Ok(()) => output.success("Configuration is valid"),
                    Err(e) => {
                        output.error(&format!("Configuration is invalid: {}", e));
                        return Ok(ExitCode::FAILURE);
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Import {
            restaurant,
            table,
            file,
        }) => {
            let config = commands::load_unvalidated(&cli.config)?;
            telemetry::init(&config.server, cli.verbose);

            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let warehouse = AppState::connect_warehouse(&config).await?;
            let tables = foodatlas::analytics::DashboardTables::from_config(&config.warehouse);

            let loaded =
                commands::import_csv(warehouse.as_ref(), &tables, table, &restaurant, &bytes)
                    .await?;
            output.success(&format!(
                "Imported {} rows from {} for restaurant {}",
                loaded,
                file.display(),
                restaurant
            ));
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Serve) | None => {
            serve(&cli.config, cli.verbose, output).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(config_path: &Path, verbose: bool, output: &Output) -> anyhow::Result<()> {
    let config_manager = Arc::new(
        AtlasConfigManager::new(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?,
    );
    let config = config_manager.config();

    output.banner();
    telemetry::init(&config.server, verbose);

    if let Err(e) = config_manager.start_watching() {
        tracing::warn!("Config hot-reload disabled: {}", e);
    }

    let state = AppState::from_config(config_manager.clone()).await?;
    let app = create_router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("Server running on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    config_manager.stop_watching();
    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
