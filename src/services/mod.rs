pub(crate) mod aggregation;
pub(crate) mod analysis;
pub(crate) mod audit;
pub(crate) mod inference;
pub(crate) mod ledger;
pub(crate) mod notify;
pub(crate) mod originality;
pub(crate) mod pipeline;
pub(crate) mod retrieval;
pub(crate) mod urls;
pub(crate) mod vcs;
