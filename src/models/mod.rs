pub mod classroom;
pub mod envelope;

pub use classroom::{Classroom, ClassroomPatch, CreateClassroomRequest, UpdateClassroomRequest};
pub use envelope::ApiResponse;
