use std::any::Any;

use diesel::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use super::DbPool;
use crate::errors::StorageError;
use findash_core::errors::{DatabaseError, Error, Result};

// A write job runs on the actor's connection, inside an immediate transaction.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;
type BoxedAny = Box<dyn Any + Send + 'static>;
type Envelope = (Job<BoxedAny>, oneshot::Sender<Result<BoxedAny>>);

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Envelope>,
}

impl WriteHandle {
    /// Runs `job` on the writer's dedicated connection and waits for its
    /// result. Jobs execute one at a time in submission order, so a
    /// read-compare-write inside one job is atomic with respect to every other
    /// writer.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as BoxedAny)),
                ret_tx,
            ))
            .await
            .map_err(|_| writer_gone("writer actor has stopped"))?;

        let boxed = ret_rx
            .await
            .map_err(|_| writer_gone("writer actor dropped the reply"))??;
        boxed
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| Error::Database(DatabaseError::Internal("writer result type mismatch".into())))
    }
}

fn writer_gone(reason: &str) -> Error {
    Error::Database(DatabaseError::ConnectionFailed(reason.to_string()))
}

/// Spawns the single writer task. It holds one pooled connection for its
/// whole life and exits once every [`WriteHandle`] is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<Envelope>(1024);

    tokio::spawn(async move {
        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                error!("Writer actor could not get a connection: {}", e);
                return;
            }
        };

        while let Some((job, reply_tx)) = rx.recv().await {
            let result: Result<BoxedAny> = conn
                .immediate_transaction::<_, StorageError, _>(|c| job(c).map_err(StorageError::from))
                .map_err(Error::from);

            // The caller may have been cancelled while waiting.
            let _ = reply_tx.send(result);
        }
        debug!("Writer actor stopped");
    });

    WriteHandle { tx }
}
