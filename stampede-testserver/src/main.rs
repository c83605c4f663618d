use std::net::SocketAddr;

use anyhow::Context as _;
use stampede_testserver::TestServer;

const USAGE: &str = "stampede-testserver [--bind 127.0.0.1:0]

Routes:
  GET /hello
  GET /slow?ms=N
  GET /flaky?every=N      (every Nth request answers 500)
  GET /status/{code}

Prints HTTP_URL=<url> to stdout once listening; Ctrl-C stops it.";

fn parse_args() -> anyhow::Result<Option<SocketAddr>> {
    let mut bind = SocketAddr::from(([127, 0, 0, 1], 0));
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let raw = args.next().context("--bind requires an address")?;
                bind = raw
                    .parse()
                    .with_context(|| format!("invalid --bind address: {raw}"))?;
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(None);
            }
            other => anyhow::bail!("unknown argument: {other}\n\n{USAGE}"),
        }
    }

    Ok(Some(bind))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let Some(bind) = parse_args()? else {
        return Ok(());
    };

    let server = TestServer::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    println!("HTTP_URL={}", server.base_url());

    tokio::signal::ctrl_c().await.context("failed to wait for Ctrl-C")?;
    eprintln!(
        "stampede-testserver: served {} requests ({} errors)",
        server.stats().requests_total(),
        server.stats().errors_served()
    );
    server.shutdown().await;
    Ok(())
}
