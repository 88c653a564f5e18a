pub mod ballot;
pub mod configuration;
pub mod form;

pub use ballot::{Ballot, BallotError};
pub use configuration::{Configuration, QuestionId, Rank, Select, Subject, Text};
pub use form::{
    Form, FormId, FormStatus, PubsharesUnit, PubsharesUnits, Roster, RosterMember,
    ShuffleInstance, Suffragia,
};
