pub mod envelope;
pub mod error;
pub mod id;
pub mod instance;
pub mod requests;
pub mod responses;


pub use envelope::{Envelope, Header, MessageStatus, MessageType, HEADER_LEN, MAGIC, MAX_BODY_SIZE, VERSION};
pub use error::{Phase, Result, TribleError};
pub use id::IdGenerator;
pub use instance::ServiceInstance;
pub use requests::{MethodName, Request, RequestId, RpcArgs};
pub use responses::{
    RemoteException, Response, RpcResult, STATUS_BUSINESS_ERROR, STATUS_NO_CONTENT, STATUS_OK,
};
