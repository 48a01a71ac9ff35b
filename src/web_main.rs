//! Web 服务器主程序入口

#[cfg(feature = "web")]
use twelvify::web::{WebConfig, WebServer};

#[cfg(feature = "web")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载 .env（若存在）并初始化日志
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 解析命令行参数
    let args: Vec<String> = std::env::args().collect();

    let mut bind_override: Option<String> = None;
    let mut port_override: Option<u16> = None;

    // 简单的命令行参数解析
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    bind_override = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("Error: --bind requires an address");
                    std::process::exit(1);
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port_override = Some(args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("Error: Invalid port number");
                        std::process::exit(1);
                    }));
                    i += 2;
                } else {
                    eprintln!("Error: --port requires a port number");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Error: Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 创建 Web 配置（环境变量为基础，命令行覆盖）
    let mut web_config = WebConfig::from_env()?;
    if let Some(bind_addr) = bind_override {
        web_config.bind_addr = bind_addr;
    }
    if let Some(port) = port_override {
        web_config.port = port;
    }
    web_config.validate()?;

    // 启动 Web 服务器
    let server = WebServer::new(web_config);
    server.start().await?;

    Ok(())
}

#[cfg(feature = "web")]
fn print_help() {
    println!("Twelvify Proxy Server");
    println!();
    println!("USAGE:");
    println!("    twelvify-web [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -b, --bind <ADDRESS>     Bind address [default: 127.0.0.1]");
    println!("    -p, --port <PORT>        Port number [default: 3000]");
    println!("    -h, --help               Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    OPENAI_API_KEY           Upstream API key (required)");
    println!("    OPENAI_BASE_URL          Upstream base URL [default: https://api.openai.com/v1]");
    println!("    OPENAI_MODEL             Upstream model [default: gpt-4o-mini]");
    println!("    TWELVIFY_RATE_LIMIT      Requests per fingerprint per minute [default: 30]");
    println!();
    println!("EXAMPLES:");
    println!("    twelvify-web");
    println!("    twelvify-web --bind 0.0.0.0 --port 3000");
}

#[cfg(not(feature = "web"))]
fn main() {
    eprintln!("Error: Web feature not enabled. Please compile with --features web");
    std::process::exit(1);
}
