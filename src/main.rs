use clap::Parser;
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use webstrand::broadcast::BroadcastChannel;
use webstrand::cli::Cli;
use webstrand::controllers::{
    Faulty, Index, LiveStream, NotFound, RedirectHome, Report, StaticAsset,
};
use webstrand::dispatcher::{RequestDispatcher, RouteTable};
use webstrand::reactor::EventLoop;
use webstrand::runtime_config::RuntimeConfig;
use webstrand::server::{EngineService, HttpServer};
use webstrand::templates::TemplateCache;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();
    may::config().set_stack_size(config.stack_size);

    let templates = Arc::new(TemplateCache::from_dir(&cli.templates).unwrap_or_else(|err| {
        warn!(error = %err, "no templates loaded, render routes will 500");
        TemplateCache::from_sources(HashMap::new())
    }));

    let (event_loop, scheduler) = EventLoop::new();
    let _loop_handle = event_loop.spawn();

    // One shared live channel; a ticker coroutine stands in for a real feed.
    let live = BroadcastChannel::new();
    {
        let live = live.clone();
        may::go!(move || {
            let mut n = 0u64;
            loop {
                live.push(format!("tick {n}\n").into_bytes());
                n += 1;
                may::coroutine::sleep(Duration::from_secs(1));
            }
        });
    }

    let mut table = RouteTable::new();
    table.route(Method::GET, "/", "index", |_| Box::new(Index));
    table.route(Method::GET, "/report", "report", |_| Box::new(Report));
    table.route(Method::GET, "/redirect", "redirect", |_| Box::new(RedirectHome));
    table.route(Method::GET, "/error", "faulty", |_| Box::new(Faulty));
    {
        let media = cli.media.clone();
        table.route(Method::GET, "/media", "media", move |_| {
            Box::new(StaticAsset::new(media.clone()))
        });
    }
    {
        let live = live.clone();
        table.route(Method::GET, "/stream", "live_stream", move |_| {
            Box::new(LiveStream::new(live.clone()))
        });
    }

    let dispatcher = Arc::new(RequestDispatcher::new(
        Arc::new(table),
        |_| Box::new(NotFound),
        templates,
        scheduler.clone(),
    ));

    let server = HttpServer(EngineService::new(dispatcher)).start(&cli.addr)?;
    info!(addr = %cli.addr, "webstrand demo server listening");
    server
        .join()
        .map_err(|_| anyhow::anyhow!("server coroutine panicked"))?;
    scheduler.shutdown();
    Ok(())
}
