pub mod supabase;

pub use supabase::{database_error, DatabaseError, SupabaseClient};
