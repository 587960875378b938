mod runtime;
mod scenarios;
