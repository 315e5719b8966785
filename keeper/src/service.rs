//! Single-writer vault service
//!
//! The vault lives inside one tokio task. Callers talk to it through a
//! cloneable [`VaultHandle`]; commands are applied strictly one at a time in
//! arrival order.

use collateral_vault::{CallContext, Vault, VaultError, VaultEvent, VaultResult, VaultStatus};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("vault service stopped")]
    Stopped,
    #[error(transparent)]
    Vault(#[from] VaultError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Requests the keeper submits to the vault task
pub enum Command {
    Status {
        reply: oneshot::Sender<VaultResult<VaultStatus>>,
    },
    Deplete {
        ctx: CallContext,
        assets: u128,
        reply: oneshot::Sender<VaultResult<u128>>,
    },
    Refill {
        ctx: CallContext,
        assets: u128,
        reply: oneshot::Sender<VaultResult<u128>>,
    },
    DrainEvents {
        reply: oneshot::Sender<Vec<VaultEvent>>,
    },
}

pub struct VaultService;

impl VaultService {
    /// Move `vault` into its own task
    ///
    /// The task ends, handing the vault back, once every handle is dropped.
    pub fn spawn(vault: Vault, capacity: usize) -> (VaultHandle, JoinHandle<Vault>) {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(run(vault, rx));
        (VaultHandle { tx }, task)
    }
}

async fn run(mut vault: Vault, mut rx: mpsc::Receiver<Command>) -> Vault {
    while let Some(command) = rx.recv().await {
        apply(&mut vault, command);
    }
    log::debug!("vault service: all handles dropped, stopping");
    vault
}

// A dropped reply receiver only means the caller stopped waiting
fn apply(vault: &mut Vault, command: Command) {
    match command {
        Command::Status { reply } => {
            let _ = reply.send(vault.status());
        }
        Command::Deplete { ctx, assets, reply } => {
            let _ = reply.send(vault.deplete(&ctx, assets));
        }
        Command::Refill { ctx, assets, reply } => {
            let _ = reply.send(vault.refill(&ctx, assets));
        }
        Command::DrainEvents { reply } => {
            let _ = reply.send(vault.drain_events());
        }
    }
}

#[derive(Clone)]
pub struct VaultHandle {
    tx: mpsc::Sender<Command>,
}

impl VaultHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> ServiceResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    pub async fn status(&self) -> ServiceResult<VaultStatus> {
        Ok(self.call(|reply| Command::Status { reply }).await??)
    }

    pub async fn deplete(&self, ctx: CallContext, assets: u128) -> ServiceResult<u128> {
        Ok(self.call(|reply| Command::Deplete { ctx, assets, reply }).await??)
    }

    pub async fn refill(&self, ctx: CallContext, assets: u128) -> ServiceResult<u128> {
        Ok(self.call(|reply| Command::Refill { ctx, assets, reply }).await??)
    }

    pub async fn drain_events(&self) -> ServiceResult<Vec<VaultEvent>> {
        self.call(|reply| Command::DrainEvents { reply }).await
    }
}
