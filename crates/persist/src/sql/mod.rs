//! SQL building blocks: the parameter-safe [`Sql`] accumulator, the
//! [`SqlTree`] query representation and the row materializer.

mod builder;
pub(crate) mod lexer;
mod materialize;
mod tree;


pub use builder::Sql;
pub use tree::{
    Action, ColumnDef, Direction, Include, Join, JoinKind, OrderBy, Predicate, SqlTree,
};
