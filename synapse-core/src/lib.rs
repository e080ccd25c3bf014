mod client;
mod entity;

pub use client::{
    AddPartResponse, AnnotationValue, Annotations, ApiErrorClass, ChildrenPage, FileHandle,
    MultipartUploadRequest, MultipartUploadStatus, NewFileEntity, PartPresignedUrl,
    SynapseClient, SynapseError, UserProfile,
};
pub use entity::{Entity, EntityHeader, EntityKind};
