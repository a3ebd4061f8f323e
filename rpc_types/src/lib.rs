//! Generated `tonic`/`prost` stubs for the RPC surface of §6: the scheduler's
//! `SchedulerService` (heartbeat, placement) and every worker's `WorkerService`
//! (store, retrieve). Nothing in this crate is hand-written except this module
//! wiring — the message and client/server types come out of `build.rs`.

pub mod scheduler {
    tonic::include_proto!("scheduler");
}

pub mod worker {
    tonic::include_proto!("worker");
}
