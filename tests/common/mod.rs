pub(crate) mod fixtures;

pub(crate) mod ledger;

pub(crate) mod logging;

pub(crate) mod network;

pub(crate) mod pacemaker;

pub(crate) mod vertex_store;
