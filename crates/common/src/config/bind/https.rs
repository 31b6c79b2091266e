use serde::{Deserialize, Serialize};

/// HTTPS 服务绑定配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpsBindConfig {
    /// 域名，必须与证书中的域名匹配
    pub domain_name: String,

    /// 绑定 IP 地址
    pub ip: String,

    /// 绑定端口
    pub port: u16,

    /// PEM 格式证书文件路径
    pub cert: String,

    /// PEM 格式私钥文件路径
    pub key: String,
}

impl Default for HttpsBindConfig {
    fn default() -> Self {
        Self {
            domain_name: "localhost".to_string(),
            ip: "0.0.0.0".to_string(),
            port: 8443,
            cert: "certificates/server.crt".to_string(),
            key: "certificates/server.key".to_string(),
        }
    }
}

impl HttpsBindConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
