pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        issuer: String,
        kid: String,
        private_key_path: String,
        public_key_path: String,
    },
}
