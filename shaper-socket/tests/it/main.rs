mod client_server;
mod partial;
