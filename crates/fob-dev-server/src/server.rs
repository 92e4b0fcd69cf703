//! Server assembly: compiler, WebSocket namespaces and HTTP routes.

use crate::config::DevServerConfig;
use crate::context::ServerContext;
use crate::delegate::{ApiDelegate, CompilerApi, CompilerHmrDelegate, Delegates, HmrDelegate, MessagesDelegate};
use crate::error::{DevServerError, Result};
use crate::http::{self, HttpState};
use crate::ui;
use crate::wss::servers::{
    ApiServer, DevClientServer, EventsServer, ExternalEndpoint, HmrServer, MessageServer,
    WebSocketServerAdapter,
};
use crate::wss::{upgrade_middleware, WebSocketRouter};
use axum::{middleware::from_fn_with_state, Router};
use fob_multi_compiler::{BuildEngine, MultiCompiler};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Endpoints implemented outside this crate, mounted under `/inspector/*`.
#[derive(Default, Clone)]
pub struct ExternalEndpoints {
    pub device_debug: Option<Arc<dyn ExternalEndpoint>>,
    pub debugger: Option<Arc<dyn ExternalEndpoint>>,
}

/// Development server.
///
/// Owns the [`MultiCompiler`] and every WebSocket namespace. Construction
/// wires them together; [`serve`](Self::serve) starts watching and answers
/// requests until shutdown.
pub struct DevServer {
    config: DevServerConfig,
    compiler: Arc<MultiCompiler>,
    router: Arc<WebSocketRouter>,
    hmr: Arc<HmrServer>,
    messages: Arc<MessageServer>,
    events: Arc<EventsServer>,
    api: Arc<ApiServer>,
    message_delegate: Arc<dyn MessagesDelegate>,
}

impl DevServer {
    /// Create a development server.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated before anything is built
    /// * `engine` - Creates one pipeline per configured target
    /// * `delegates` - Unset HMR/API delegates default to the compiler
    /// * `endpoints` - Inspector endpoints; missing ones close connections
    ///
    /// # Errors
    ///
    /// Configuration errors, pipeline creation failures and route conflicts.
    pub fn new(
        config: DevServerConfig,
        engine: Arc<dyn BuildEngine>,
        delegates: Delegates,
        endpoints: ExternalEndpoints,
    ) -> Result<Self> {
        config.validate()?;

        let compiler = Arc::new(MultiCompiler::new(config.compiler_config(), engine)?);

        let hmr_delegate: Arc<dyn HmrDelegate> = match delegates.hmr {
            Some(delegate) => delegate,
            None => Arc::new(CompilerHmrDelegate::new(&compiler)),
        };
        let api_delegate: Arc<dyn ApiDelegate> = match delegates.api {
            Some(delegate) => delegate,
            None => Arc::new(CompilerApi::new(Arc::clone(&compiler))),
        };

        let hmr = Arc::new(HmrServer::new(hmr_delegate));
        let messages = Arc::new(MessageServer::new());
        let events = Arc::new(EventsServer::new(Arc::clone(&messages)));
        let api = Arc::new(ApiServer::new(api_delegate));

        let mut router = WebSocketRouter::new();
        router.register_server(hmr.clone())?;
        router.register_server(messages.clone())?;
        router.register_server(events.clone())?;
        router.register_server(api.clone())?;
        router.register_server(Arc::new(DevClientServer::new(delegates.logger)))?;
        router.register_server(Arc::new(WebSocketServerAdapter::device_debug(
            endpoints.device_debug,
        )))?;
        router.register_server(Arc::new(WebSocketServerAdapter::debugger(endpoints.debugger)))?;
        router.freeze();

        compiler.initialize(Arc::new(ServerContext::new(
            Arc::clone(&hmr),
            Arc::clone(&messages),
            Arc::clone(&events),
        )))?;

        Ok(Self {
            config,
            compiler,
            router: Arc::new(router),
            hmr,
            messages,
            events,
            api,
            message_delegate: delegates.messages,
        })
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    pub fn compiler(&self) -> &Arc<MultiCompiler> {
        &self.compiler
    }

    pub fn hmr(&self) -> &Arc<HmrServer> {
        &self.hmr
    }

    pub fn messages(&self) -> &Arc<MessageServer> {
        &self.messages
    }

    pub fn events(&self) -> &Arc<EventsServer> {
        &self.events
    }

    /// Paths with a WebSocket server behind them.
    pub fn websocket_paths(&self) -> Vec<String> {
        self.router.paths()
    }

    /// The complete HTTP application, upgrades included.
    pub fn app(&self) -> Router {
        let state = HttpState {
            compiler: Arc::clone(&self.compiler),
            messages: Arc::clone(&self.message_delegate),
        };

        http::router(state, self.api.routes())
            .layer(from_fn_with_state(Arc::clone(&self.router), upgrade_middleware))
    }

    /// Start watching and serve `listener` until `shutdown` resolves.
    ///
    /// Pending artifact requests are cancelled on the way out.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.compiler.start_watching()?;
        let relay = self.events.start_relay();

        let result = axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await;

        relay.abort();
        self.compiler.shutdown();
        result.map_err(|e| DevServerError::Server(format!("Server error: {}", e)))
    }

    /// Bind the configured address and serve until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the server fails.
    pub async fn run(self) -> Result<()> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DevServerError::Server(format!("Failed to bind to {}: {}", addr, e)))?;
        let url = format!("http://{}", listener.local_addr()?);

        let targets: Vec<String> = self
            .compiler
            .targets()
            .iter()
            .map(|target| target.to_string())
            .collect();
        ui::print_server_banner(&url, &targets, &self.websocket_paths());
        ui::info("Press Ctrl+C to stop");

        self.serve(listener, shutdown_signal()).await?;

        ui::success("Development server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    ui::info("Shutting down development server...");
}
