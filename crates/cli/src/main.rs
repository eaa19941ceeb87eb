// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! corral: command-line front-end for the control plane.
//!
//! Exits 0 on success; any failure from the API propagates as a
//! non-zero exit.

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::ApiClient;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "corral", version, about = "Corral control-plane CLI")]
struct Cli {
    /// corrald base URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check daemon and backend health
    Ping,
    /// Platform images known across the fleet
    Platforms,
    /// Server operations
    #[command(subcommand)]
    Server(ServerCmd),
    /// Place a VM
    Alloc {
        /// RAM in MiB
        #[arg(long)]
        ram: u64,
        /// Owner uuid
        #[arg(long)]
        owner: String,
        /// Disk quota in GiB
        #[arg(long, default_value_t = 0)]
        quota: u64,
        /// Restrict to these server uuids
        #[arg(long = "server")]
        servers: Vec<String>,
    },
    /// Waitlist tickets
    #[command(subcommand)]
    Ticket(TicketCmd),
    /// CN agent tasks
    #[command(subcommand)]
    Task(TaskCmd),
    /// Netboot parameters
    #[command(subcommand)]
    Boot(BootCmd),
    /// Rolling reboot plans
    #[command(subcommand)]
    Plan(PlanCmd),
}

#[derive(Subcommand)]
enum ServerCmd {
    /// List servers
    List {
        #[arg(long)]
        setup: Option<bool>,
    },
    /// Show one server
    Get { uuid: String },
    /// Reboot one server
    Reboot { uuid: String },
    /// Return a server to the unsetup pool
    FactoryReset { uuid: String },
}

#[derive(Subcommand)]
enum TicketCmd {
    /// Create a ticket on a server
    Create {
        server: String,
        #[arg(long, default_value = "vm")]
        scope: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        action: String,
        /// ISO-8601 expiry
        #[arg(long)]
        expires_at: String,
    },
    Get { uuid: String },
    /// Block until active or expired
    Wait {
        uuid: String,
        #[arg(long)]
        timeout: Option<u64>,
    },
    Release { uuid: String },
    /// Tickets queued on a server
    List { server: String },
}

#[derive(Subcommand)]
enum TaskCmd {
    Get { taskid: String },
    Wait {
        taskid: String,
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand)]
enum BootCmd {
    /// Boot params for a server (or "default")
    Get { uuid: String },
}

#[derive(Subcommand)]
enum PlanCmd {
    Create {
        /// Server uuids to reboot
        servers: Vec<String>,
        #[arg(long, default_value_t = 1)]
        concurrency: u32,
        #[arg(long)]
        single_step: bool,
    },
    List {
        #[arg(long)]
        include_finished: bool,
    },
    Get { uuid: String },
    Run { uuid: String },
    Stop { uuid: String },
    Continue { uuid: String },
    Cancel { uuid: String },
}

async fn run(cli: Cli) -> Result<Value> {
    let api = ApiClient::new(cli.url.trim_end_matches('/'));

    match cli.command {
        Command::Ping => api.get("/ping").await,
        Command::Platforms => api.get("/platforms").await,

        Command::Server(cmd) => match cmd {
            ServerCmd::List { setup } => {
                let query = match setup {
                    Some(setup) => format!("/servers?setup={setup}"),
                    None => "/servers".to_string(),
                };
                api.get(&query).await
            }
            ServerCmd::Get { uuid } => api.get(&format!("/servers/{uuid}")).await,
            ServerCmd::Reboot { uuid } => api.post(&format!("/servers/{uuid}/reboot"), json!({})).await,
            ServerCmd::FactoryReset { uuid } => {
                api.put(&format!("/servers/{uuid}/factory-reset"), json!({})).await
            }
        },

        Command::Alloc { ram, owner, quota, servers } => {
            let mut body = json!({ "vm": { "ram": ram, "owner_uuid": owner, "quota": quota } });
            if !servers.is_empty() {
                body["servers"] = json!(servers);
            }
            api.post("/allocate", body).await
        }

        Command::Ticket(cmd) => match cmd {
            TicketCmd::Create { server, scope, id, action, expires_at } => {
                api.post(
                    &format!("/servers/{server}/tickets"),
                    json!({ "scope": scope, "id": id, "action": action, "expires_at": expires_at }),
                )
                .await
            }
            TicketCmd::Get { uuid } => api.get(&format!("/tickets/{uuid}")).await,
            TicketCmd::Wait { uuid, timeout } => {
                let query = match timeout {
                    Some(secs) => format!("/tickets/{uuid}/wait?timeout={secs}"),
                    None => format!("/tickets/{uuid}/wait"),
                };
                api.get(&query).await
            }
            TicketCmd::Release { uuid } => api.put(&format!("/tickets/{uuid}/release"), json!({})).await,
            TicketCmd::List { server } => api.get(&format!("/servers/{server}/tickets")).await,
        },

        Command::Task(cmd) => match cmd {
            TaskCmd::Get { taskid } => api.get(&format!("/tasks/{taskid}")).await,
            TaskCmd::Wait { taskid, timeout } => {
                let query = match timeout {
                    Some(secs) => format!("/tasks/{taskid}/wait?timeout={secs}"),
                    None => format!("/tasks/{taskid}/wait"),
                };
                api.get(&query).await
            }
        },

        Command::Boot(cmd) => match cmd {
            BootCmd::Get { uuid } => api.get(&format!("/boot/{uuid}")).await,
        },

        Command::Plan(cmd) => match cmd {
            PlanCmd::Create { servers, concurrency, single_step } => {
                api.post(
                    "/reboot-plans",
                    json!({ "servers": servers, "concurrency": concurrency, "single_step": single_step }),
                )
                .await
            }
            PlanCmd::List { include_finished } => {
                api.get(&format!("/reboot-plans?include_finished={include_finished}")).await
            }
            PlanCmd::Get { uuid } => api.get(&format!("/reboot-plans/{uuid}")).await,
            PlanCmd::Run { uuid } => plan_action(&api, &uuid, "run").await,
            PlanCmd::Stop { uuid } => plan_action(&api, &uuid, "stop").await,
            PlanCmd::Continue { uuid } => plan_action(&api, &uuid, "continue").await,
            PlanCmd::Cancel { uuid } => plan_action(&api, &uuid, "cancel").await,
        },
    }
}

async fn plan_action(api: &ApiClient, uuid: &str, action: &str) -> Result<Value> {
    api.put(&format!("/reboot-plans/{uuid}"), json!({ "action": action })).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(Value::Null) => {}
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        }
        Err(e) => {
            eprintln!("corral: {e}");
            std::process::exit(1);
        }
    }
}
