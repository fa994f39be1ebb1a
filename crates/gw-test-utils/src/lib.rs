// gw-test-utils: in-process mock Modbus/TCP and CIP devices shared by
// gw-core's unit tests and the workspace's end-to-end suites.

mod mock_cip_server;
mod mock_modbus_server;

pub use mock_cip_server::MockCipServer;
pub use mock_modbus_server::MockModbusServer;
