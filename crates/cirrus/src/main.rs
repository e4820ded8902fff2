mod commands;

use cirrus_azure::AzureProvider;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cirrus")]
#[command(about = "Declarative Azure resources for the Cirrus engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information
    Version,
    /// List the resource and finder types this provider implements
    Types,
    /// Look up live resources of a type
    Find {
        /// Resource type (e.g. disk, cdn-endpoint)
        resource_type: String,
        /// Full resource id; lists the whole subscription when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Manage SSL certificates on an application gateway
    #[command(name = "application-gateway", subcommand)]
    ApplicationGateway(GatewayCommands),
}

#[derive(Subcommand)]
enum GatewayCommands {
    /// Upload a PFX certificate
    #[command(name = "add-certificate")]
    AddCertificate {
        resource_group: String,
        gateway: String,
        /// Certificate name on the gateway
        name: String,
        /// Path to the .pfx file
        pfx_path: PathBuf,
        /// PFX password (prompted for when omitted)
        #[arg(long, env = "CIRRUS_PFX_PASSWORD")]
        password: Option<String>,
    },
    /// Reference a certificate stored in Azure Key Vault
    #[command(name = "import-certificate")]
    ImportCertificate {
        resource_group: String,
        gateway: String,
        name: String,
        /// Key Vault secret id (https://<vault>.vault.azure.net/secrets/<name>)
        secret_id: String,
    },
    /// List the certificates on a gateway
    #[command(name = "list-certificate")]
    ListCertificate {
        resource_group: String,
        gateway: String,
    },
    /// Remove a certificate no listener uses
    #[command(name = "remove-certificate")]
    RemoveCertificate {
        resource_group: String,
        gateway: String,
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr、結果は stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Commands::Version => {
            println!("cirrus {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Types => {
            commands::find::handle_types(&AzureProvider::registry());
        }
        Commands::Find { resource_type, id } => {
            let provider = AzureProvider::new();
            let client = provider.client().await?;
            commands::find::handle_find(
                &AzureProvider::registry(),
                client,
                &resource_type,
                id.as_deref(),
            )
            .await?;
        }
        Commands::ApplicationGateway(command) => {
            let provider = AzureProvider::new();
            run_gateway_command(&provider, command).await?;
        }
    }

    Ok(())
}

async fn run_gateway_command(
    provider: &AzureProvider,
    command: GatewayCommands,
) -> anyhow::Result<()> {
    use commands::certificate;

    match command {
        GatewayCommands::AddCertificate {
            resource_group,
            gateway,
            name,
            pfx_path,
            password,
        } => {
            // 証明書ファイルを先に読み、パスワードの入力前に失敗させる
            let data = certificate::read_pfx(&pfx_path).await?;
            let password = match password {
                Some(password) => Some(password),
                None => certificate::prompt_password()?,
            };
            let client = provider.client().await?;
            certificate::handle_add(client, &resource_group, &gateway, &name, data, password)
                .await?;
        }
        GatewayCommands::ImportCertificate {
            resource_group,
            gateway,
            name,
            secret_id,
        } => {
            let client = provider.client().await?;
            certificate::handle_import(client, &resource_group, &gateway, &name, &secret_id)
                .await?;
        }
        GatewayCommands::ListCertificate {
            resource_group,
            gateway,
        } => {
            let client = provider.client().await?;
            certificate::handle_list(client, &resource_group, &gateway).await?;
        }
        GatewayCommands::RemoveCertificate {
            resource_group,
            gateway,
            name,
        } => {
            let client = provider.client().await?;
            certificate::handle_remove(client, &resource_group, &gateway, &name).await?;
        }
    }
    Ok(())
}
