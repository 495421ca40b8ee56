mod dispatcher;
mod loops;

pub(crate) use dispatcher::Dispatcher;
