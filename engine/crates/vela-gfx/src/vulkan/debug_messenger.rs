use std::ffi::CStr;

use ash::vk;

/// validation layer 的消息转发到 log
pub(crate) struct DebugMsger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMsger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Option<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger = unsafe { loader.create_debug_utils_messenger(&Self::messenger_ci(), None) };
        match messenger {
            Ok(messenger) => Some(Self { loader, messenger }),
            Err(e) => {
                log::warn!("failed to create debug messenger: {:?}", e);
                None
            }
        }
    }

    pub fn messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }

    pub fn destroy(&self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let msg = if p_callback_data.is_null() || unsafe { (*p_callback_data).p_message.is_null() } {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr((*p_callback_data).p_message).to_string_lossy() }
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[{:?}] {}", message_type, msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[{:?}] {}", message_type, msg),
        _ => log::info!("[{:?}] {}", message_type, msg),
    };

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}
