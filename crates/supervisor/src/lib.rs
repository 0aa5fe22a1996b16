//! flowtest 프로세스 감독
//!
//! - [`workspace::WorkspaceHandle`]: 실행별 임시 디렉터리
//! - [`process::ManagedProcess`]: 순서 있는 정지를 지원하는 감독 대상 하위 프로세스
//! - [`store::start_metadata_store`], [`worker::start_compute_worker`]:
//!   프로세스가 사용 가능해진 뒤에만 반환하는 실행기

pub mod error;
pub mod process;
pub mod store;
pub mod worker;
pub mod workspace;

pub use error::SupervisorError;
pub use process::{ManagedProcess, ProcessExit, ProcessSpec};
pub use store::start_metadata_store;
pub use worker::{WORKER_PROCESS, start_compute_worker};
pub use workspace::WorkspaceHandle;
