mod resource_group;

pub use resource_group::ResourceGroup;
