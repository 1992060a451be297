use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use maitake_sync::WaitMap;
use portable_atomic::{AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProcedureError {
    #[error("The handle used to respond to this request was dropped before making a response")]
    HandleDropped,
    #[error("The procedure channel is closed, and no further requests can be made")]
    Closed,
}

/// Request-response rendezvous between tasks. A requester awaits the
/// response to its specific request, identified by a monotonically
/// increasing index, while the serving task receives requests together
/// with a [`Handle`] used to answer them.
pub struct Procedure<M: RawMutex, REQ, RES, const N: usize> {
    count: AtomicUsize,
    ch: Channel<M, (usize, REQ), N>,
    map: WaitMap<usize, Option<RES>>,
}

impl<M: RawMutex, REQ, RES, const N: usize> Procedure<M, REQ, RES, N> {
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            ch: Channel::new(),
            map: WaitMap::new(),
        }
    }

    /// Make a request and wait for the matching response.
    pub async fn request(&self, req: REQ) -> Result<RES, ProcedureError> {
        let idx = self.new_index();

        // Insert ourselves in the queue for the index before sending,
        // so the response cannot race past us.
        let waiter = self.map.wait(idx);
        futures::pin_mut!(waiter);

        waiter
            .as_mut()
            .subscribe()
            .await
            .ok()
            .ok_or(ProcedureError::Closed)?;

        self.ch.send((idx, req)).await;

        // Wait for the response
        waiter
            .await
            .ok()
            .ok_or(ProcedureError::Closed)?
            .ok_or(ProcedureError::HandleDropped)
    }

    /// Make a request without waiting for the response. The serving
    /// task answers into the void.
    pub async fn send(&self, req: REQ) {
        let idx = self.new_index();
        self.ch.send((idx, req)).await;
    }

    /// Receive a request together with the handle used to answer it.
    pub async fn get_request(&self) -> (REQ, Handle<'_, M, REQ, RES, N>) {
        let (idx, req) = self.ch.receive().await;
        (req, Handle { idx, proc: self })
    }

    fn new_index(&self) -> usize {
        self.count.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handle to produce a response to a specific request.
pub struct Handle<'a, M: RawMutex, REQ, RES, const N: usize> {
    idx: usize,
    proc: &'a Procedure<M, REQ, RES, N>,
}

impl<'a, M: RawMutex, REQ, RES, const N: usize> Handle<'a, M, REQ, RES, N> {
    /// Respond to the request, consuming this handle and waking the
    /// requester.
    pub fn respond(self, res: RES) {
        self.proc.map.wake(&self.idx, Some(res));
    }

    /// Notify the requester that no response will come. This also
    /// happens automatically when the handle is dropped unanswered.
    pub fn close(&self) {
        self.proc.map.wake(&self.idx, None);
    }
}

impl<'a, M: RawMutex, REQ, RES, const N: usize> Drop for Handle<'a, M, REQ, RES, N> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use futures::task::SpawnExt;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestReq {
        Get,
        Set(f32),
        Reject,
        Exit,
    }

    #[test]
    fn request_response_round_trip() {
        static PROCEDURE: Procedure<CriticalSectionRawMutex, TestReq, Result<f32, ()>, 2> =
            Procedure::new();

        let mut pool = futures_executor::LocalPool::new();

        pool.spawner()
            .spawn(async {
                let mut value = 5.0;
                loop {
                    let (req, handle) = PROCEDURE.get_request().await;
                    match req {
                        TestReq::Get => handle.respond(Ok(value)),
                        TestReq::Set(val) => {
                            value = val;
                            handle.respond(Ok(val));
                        }
                        TestReq::Reject => drop(handle),
                        TestReq::Exit => {
                            handle.respond(Ok(0.0));
                            break;
                        }
                    }
                }
            })
            .unwrap();

        pool.spawner()
            .spawn(async {
                assert_eq!(PROCEDURE.request(TestReq::Get).await, Ok(Ok(5.0)));
                assert_eq!(PROCEDURE.request(TestReq::Set(2.5)).await, Ok(Ok(2.5)));
                assert_eq!(PROCEDURE.request(TestReq::Get).await, Ok(Ok(2.5)));

                // A dropped handle must surface as an error, not hang
                assert_eq!(
                    PROCEDURE.request(TestReq::Reject).await,
                    Err(ProcedureError::HandleDropped)
                );

                assert_eq!(PROCEDURE.request(TestReq::Exit).await, Ok(Ok(0.0)));
            })
            .unwrap();

        pool.run();
    }
}
