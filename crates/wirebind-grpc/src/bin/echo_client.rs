use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use wirebind_grpc::testservice::{TEST_SERVICE, string_message, text_of};
use wirebind_grpc::{
    CallCredentials, ChannelConfig, ChannelConfigLoader, ChannelCredentials, Client, Http2Channel,
};

#[derive(Parser, Debug)]
#[command(name = "echo-client", version, author, about = "Client for the echo server")]
struct Cli {
    /// Server address, e.g. http://127.0.0.1:50051
    #[arg(long, default_value = "http://127.0.0.1:50051", conflicts_with = "config")]
    target: String,

    /// Channel configuration file (JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    auth: AuthArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct AuthArgs {
    /// Sent as `user-name` call metadata
    #[arg(long, requires = "password")]
    user: Option<String>,

    /// Sent as `user-password` call metadata
    #[arg(long, requires = "user")]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Unary echo
    Call {
        #[arg(long)]
        text: String,
    },
    /// Print every reply of the server stream
    Stream {
        #[arg(long)]
        text: String,
    },
    /// Ask for a failing call and print the returned status
    Status {
        #[arg(long)]
        text: String,
    },
}

fn channel_config(cli: &Cli) -> Result<ChannelConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ChannelConfigLoader::from_path(path)?,
        None => ChannelConfig::new(cli.target.clone(), ChannelCredentials::insecure()),
    };
    if let (Some(user), Some(password)) = (&cli.auth.user, &cli.auth.password) {
        config.credentials = config.credentials | CallCredentials::user_password(user, password);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    wirebind::telemetry::init_with_default("warn");

    let cli = Cli::parse();
    let config = channel_config(&cli)?;
    let channel = Http2Channel::connect(config).await?;
    let client = Client::with_channel(&TEST_SERVICE, Arc::new(channel));

    match cli.command {
        Commands::Call { text } => {
            let reply = client.call("testMethod", &string_message(text)?).await?;
            println!("{}", text_of(&reply));
        }
        Commands::Stream { text } => {
            let mut replies = client
                .server_stream("testMethodServerStream", &string_message(text)?)
                .await?;
            while let Some(reply) = replies.next().await {
                println!("{}", text_of(&reply?));
            }
        }
        Commands::Status { text } => {
            match client
                .call("testMethodStatusMessage", &string_message(text)?)
                .await
            {
                Ok(reply) => println!("unexpected reply: {}", text_of(&reply)),
                Err(e) => println!("{:?}: {}", e.code(), e),
            }
        }
    }
    Ok(())
}
