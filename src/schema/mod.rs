pub mod card;
pub mod context;
pub mod feedback;
pub mod template;
